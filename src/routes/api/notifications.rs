use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::notifications;
use crate::routes::api::{message, ok};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(index))
        .route("/notifications/read-all", post(read_all))
        .route("/notifications/{id}/read", post(read))
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ListQuery {
    pub unread: bool,
}

/// GET /api/notifications
pub async fn index(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let items = notifications::list(&conn, &user.id, query.unread)?;
    let unread = notifications::unread_count(&conn, &user.id)?;
    Ok(ok(json!({ "notifications": items, "unread": unread })))
}

/// POST /api/notifications/{id}/read
pub async fn read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    notifications::mark_read(&conn, &user.id, &id)?;
    Ok(message("Notification marked as read"))
}

/// POST /api/notifications/read-all
pub async fn read_all(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let count = notifications::mark_all_read(&conn, &user.id)?;
    Ok(ok(json!({ "marked": count })))
}
