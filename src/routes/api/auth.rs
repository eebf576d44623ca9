use axum::extract::State;
use axum::http::header;
use axum::http::request::Parts;
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::auth::handlers::{end_session, ensure_registration_open, start_session, LoginForm};
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::routes::api::{created, message, ok, ok_with};
use crate::state::AppState;
use crate::users::repository::{self as users, RegisterInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    ensure_registration_open(&conn)?;
    let user = users::register(&conn, input, state.config.auth.bcrypt_cost)?;
    let cookie = start_session(&state, &conn, &user.id)?;
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        created("Registration successful", user),
    )
        .into_response())
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(form): Json<LoginForm>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let user = users::authenticate(&conn, &form.email, &form.password)?;
    let cookie = start_session(&state, &conn, &user.id)?;
    tracing::info!(user_id = %user.id, "Signed in");
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        ok_with("Login successful", user),
    )
        .into_response())
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>, parts: Parts) -> AppResult<Response> {
    let cookie = end_session(&state, &parts)?;
    Ok((AppendHeaders([(header::SET_COOKIE, cookie)]), message("Logged out")).into_response())
}

/// GET /api/auth/me
pub async fn me(user: CurrentUser) -> Response {
    ok(user.0)
}
