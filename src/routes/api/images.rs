use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::response::Response;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::images::domain::Imageable;
use crate::images::{self, repository};
use crate::restaurants::repository as restaurants;
use crate::reviews::domain::ReviewStatus;
use crate::reviews::repository as reviews;
use crate::routes::api::{created, message, ok, ok_with};
use crate::routes::read_upload;
use crate::state::AppState;

pub fn router(upload_limit: DefaultBodyLimit) -> Router<AppState> {
    Router::new()
        .route(
            "/restaurants/{id}/images",
            get(list_for_restaurant).post(upload_for_restaurant),
        )
        .route(
            "/reviews/{id}/images",
            get(list_for_review).post(upload_for_review),
        )
        .layer(upload_limit)
        .route("/restaurants/{id}/images/order", put(reorder_restaurant))
        .route("/reviews/{id}/images/order", put(reorder_review))
        .route("/images/{id}", delete(destroy))
        .route("/images/{id}/primary", post(make_primary))
}

#[derive(Debug, Deserialize)]
pub struct ReorderInput {
    pub ids: Vec<String>,
}

/// Whether a visitor may see the images of `owner`.
fn check_visible(conn: &Connection, viewer: Option<&User>, owner: &Imageable) -> AppResult<()> {
    let is_admin = viewer.is_some_and(User::is_admin);
    match owner {
        Imageable::Restaurant(id) => {
            restaurants::find_visible(conn, id, is_admin)?;
        }
        Imageable::Review(id) => {
            let review = reviews::find(conn, id)?;
            let is_author = viewer.is_some_and(|v| v.id == review.user_id);
            if review.status != ReviewStatus::Approved && !is_admin && !is_author {
                return Err(AppError::NotFound);
            }
        }
    }
    Ok(())
}

async fn list(state: &AppState, viewer: Option<&User>, owner: Imageable) -> AppResult<Response> {
    let conn = state.db.get()?;
    check_visible(&conn, viewer, &owner)?;
    Ok(ok(repository::list(&conn, &owner)?))
}

async fn upload(
    state: &AppState,
    user: &User,
    owner: Imageable,
    multipart: Multipart,
) -> AppResult<Response> {
    {
        let conn = state.db.get()?;
        repository::authorize(&conn, user, &owner)?;
    }
    let upload = read_upload(multipart).await?;
    let report = images::upload(
        &state.db,
        &state.files,
        state.upload_limits(),
        &owner,
        upload.files,
        upload.primary_index,
    )
    .await?;
    let message = if report.errors.is_empty() {
        "Images uploaded"
    } else {
        "Some images could not be uploaded"
    };
    Ok(created(message, report))
}

async fn reorder(
    state: &AppState,
    user: &User,
    owner: Imageable,
    input: ReorderInput,
) -> AppResult<Response> {
    let mut conn = state.db.get()?;
    repository::authorize(&conn, user, &owner)?;
    Ok(ok_with(
        "Images reordered",
        repository::reorder(&mut conn, &owner, &input.ids)?,
    ))
}

/// GET /api/restaurants/{id}/images
pub async fn list_for_restaurant(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    list(&state, viewer.0.as_ref(), Imageable::Restaurant(id)).await
}

/// GET /api/reviews/{id}/images
pub async fn list_for_review(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    list(&state, viewer.0.as_ref(), Imageable::Review(id)).await
}

/// POST /api/restaurants/{id}/images
pub async fn upload_for_restaurant(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> AppResult<Response> {
    upload(&state, &user, Imageable::Restaurant(id), multipart).await
}

/// POST /api/reviews/{id}/images
pub async fn upload_for_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> AppResult<Response> {
    upload(&state, &user, Imageable::Review(id), multipart).await
}

/// PUT /api/restaurants/{id}/images/order
pub async fn reorder_restaurant(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(input): Json<ReorderInput>,
) -> AppResult<Response> {
    reorder(&state, &user, Imageable::Restaurant(id), input).await
}

/// PUT /api/reviews/{id}/images/order
pub async fn reorder_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(input): Json<ReorderInput>,
) -> AppResult<Response> {
    reorder(&state, &user, Imageable::Review(id), input).await
}

/// DELETE /api/images/{id}
pub async fn destroy(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let removed = {
        let mut conn = state.db.get()?;
        let image = repository::find(&conn, &id)?;
        repository::authorize(&conn, &user, &image.owner)?;
        repository::delete(&mut conn, &id)?
    };
    state.files.remove(&removed.path).await;
    Ok(message("Image deleted"))
}

/// POST /api/images/{id}/primary
pub async fn make_primary(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let mut conn = state.db.get()?;
    let image = repository::find(&conn, &id)?;
    repository::authorize(&conn, &user, &image.owner)?;
    Ok(ok_with("Primary image updated", repository::set_primary(&mut conn, &id)?))
}
