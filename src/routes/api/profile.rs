use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::reviews::repository::{self as reviews, ReviewView};
use crate::routes::api::{ok, ok_with};
use crate::routes::read_upload;
use crate::state::AppState;
use crate::users::avatar;
use crate::users::repository::{self as users, ProfileInput};

pub fn router(upload_limit: DefaultBodyLimit) -> Router<AppState> {
    Router::new()
        .route("/profile/avatar", post(upload_avatar))
        .layer(upload_limit)
        .route("/profile", get(show_own).put(update))
        .route("/users/{id}", get(show))
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub user: User,
    pub reviews: Vec<ReviewView>,
}

/// GET /api/profile
pub async fn show_own(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let reviews = reviews::list_for_user(&conn, &user.id, false, Some(&user.id))?;
    Ok(ok(ProfileView {
        user: user.0,
        reviews,
    }))
}

/// PUT /api/profile
pub async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<ProfileInput>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(ok_with(
        "Profile updated",
        users::update_profile(&conn, &user.id, input)?,
    ))
}

/// POST /api/profile/avatar
pub async fn upload_avatar(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let upload = read_upload(multipart).await?;
    let updated = avatar::replace(
        &state.db,
        &state.files,
        state.upload_limits(),
        &user.id,
        upload.files,
    )
    .await?;
    Ok(ok_with("Avatar updated", updated))
}

/// GET /api/users/{id}
pub async fn show(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let profile = users::find(&conn, &id)?;
    if !users::can_view_profile(&profile, maybe_user.0.as_ref()) {
        return Err(AppError::forbidden("This profile is private"));
    }
    let reviews = reviews::list_for_user(&conn, &profile.id, true, maybe_user.id())?;
    Ok(ok(ProfileView {
        user: profile,
        reviews,
    }))
}
