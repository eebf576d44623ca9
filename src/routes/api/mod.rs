//! JSON API. Every response uses the `{ success, message?, data?, errors? }`
//! envelope; errors get theirs from `AppError`.

pub mod admin;
pub mod auth;
pub mod favorites;
pub mod images;
pub mod notifications;
pub mod owner;
pub mod profile;
pub mod restaurants;
pub mod reviews;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;

use crate::state::AppState;

pub fn router(upload_limit: DefaultBodyLimit) -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(restaurants::router())
        .merge(reviews::router())
        .merge(images::router(upload_limit.clone()))
        .merge(profile::router(upload_limit))
        .merge(favorites::router())
        .merge(notifications::router())
        .merge(owner::router())
        .merge(admin::router())
}

pub fn ok<T: Serialize>(data: T) -> Response {
    Json(json!({ "success": true, "data": data })).into_response()
}

pub fn ok_with<T: Serialize>(message: &str, data: T) -> Response {
    Json(json!({ "success": true, "message": message, "data": data })).into_response()
}

pub fn created<T: Serialize>(message: &str, data: T) -> Response {
    (
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": message, "data": data })),
    )
        .into_response()
}

pub fn message(message: &str) -> Response {
    Json(json!({ "success": true, "message": message })).into_response()
}
