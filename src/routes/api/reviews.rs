use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::notifications::Event;
use crate::reviews::domain::{ReviewInput, ReviewStatus};
use crate::reviews::helpful;
use crate::reviews::repository as reviews;
use crate::reviews::responses::{self, ResponseInput};
use crate::routes::api::{created, message, ok, ok_with};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/reviews/{id}",
            get(show).put(update).delete(destroy),
        )
        .route("/reviews/{id}/helpful", post(toggle_helpful))
        .route(
            "/reviews/{id}/response",
            post(create_response)
                .put(update_response)
                .delete(delete_response),
        )
}

/// GET /api/reviews/{id}
/// Unapproved reviews are only visible to their author and admins.
pub async fn show(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let review = reviews::find(&conn, &id)?;
    let visible = review.status == ReviewStatus::Approved
        || maybe_user.is_admin()
        || maybe_user.id() == Some(review.user_id.as_str());
    if !visible {
        return Err(AppError::NotFound);
    }
    Ok(ok(reviews::view(&conn, review, maybe_user.id())?))
}

/// PUT /api/reviews/{id}
pub async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(input): Json<ReviewInput>,
) -> AppResult<Response> {
    let mut conn = state.db.get()?;
    let review = reviews::update(&mut conn, &user, &id, input, state.aggregate_scope())?;
    Ok(ok_with("Review updated and awaiting moderation", review))
}

/// DELETE /api/reviews/{id}
pub async fn destroy(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let paths = {
        let mut conn = state.db.get()?;
        reviews::delete(&mut conn, &user, &id, state.aggregate_scope())?
    };
    state.files.remove_all(&paths).await;
    Ok(message("Review deleted"))
}

/// POST /api/reviews/{id}/helpful
pub async fn toggle_helpful(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let mut conn = state.db.get()?;
    Ok(ok(helpful::toggle(&mut conn, &user.id, &id)?))
}

/// POST /api/reviews/{id}/response
pub async fn create_response(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(input): Json<ResponseInput>,
) -> AppResult<Response> {
    let response = {
        let conn = state.db.get()?;
        responses::create(&conn, &user, &id, input)?
    };
    state.notifier.dispatch(Event::OwnerResponse {
        review_id: id.clone(),
    });
    Ok(created("Response added", response))
}

/// PUT /api/reviews/{id}/response
pub async fn update_response(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(input): Json<ResponseInput>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(ok_with(
        "Response updated",
        responses::update(&conn, &user, &id, input)?,
    ))
}

/// DELETE /api/reviews/{id}/response
pub async fn delete_response(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    responses::delete(&conn, &user, &id)?;
    Ok(message("Response deleted"))
}
