use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::owner;
use crate::restaurants::repository::RestaurantInput;
use crate::routes::api::{ok, ok_with};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/owner/dashboard", get(dashboard))
        .route("/owner/claimable", get(claimable))
        .route("/owner/claim/{id}", post(claim))
        .route("/owner/restaurant", put(update_restaurant))
}

/// GET /api/owner/dashboard
pub async fn dashboard(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let dashboard = owner::dashboard(&conn, &user)?
        .ok_or_else(|| AppError::forbidden("You have not claimed a restaurant"))?;
    Ok(ok(dashboard))
}

/// GET /api/owner/claimable
pub async fn claimable(State(state): State<AppState>, _user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(ok(owner::claimable(&conn)?))
}

/// POST /api/owner/claim/{id}
pub async fn claim(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let mut conn = state.db.get()?;
    Ok(ok_with("Restaurant claimed", owner::claim(&mut conn, &user.id, &id)?))
}

/// PUT /api/owner/restaurant
pub async fn update_restaurant(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<RestaurantInput>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(ok_with(
        "Restaurant updated",
        owner::update_restaurant(&conn, &user, input)?,
    ))
}
