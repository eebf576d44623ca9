use axum::routing::{get, post};
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(handlers::login_page).post(handlers::login_submit))
        .route(
            "/register",
            get(handlers::register_page).post(handlers::register_submit),
        )
        .route("/logout", post(handlers::logout))
}
