use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::restaurants::repository as restaurants;
use crate::routes::api::ok;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/favorites", get(index))
        .route("/restaurants/{id}/favorite", post(toggle))
}

/// GET /api/favorites
pub async fn index(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(ok(restaurants::favorites(&conn, &user.id)?))
}

/// POST /api/restaurants/{id}/favorite
pub async fn toggle(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let favorite = restaurants::toggle_favorite(&conn, &user.id, &id)?;
    Ok(ok(json!({ "favorite": favorite })))
}
