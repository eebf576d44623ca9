use askama::Template;
use axum::extract::State;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::Form;
use rusqlite::Connection;
use serde::Deserialize;

use crate::auth::session;
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::{session_token, MaybeUser};
use crate::routes::{Html, Nav, PageResult};
use crate::settings::SiteSettings;
use crate::state::AppState;
use crate::users::repository::{self as users, RegisterInput};

// -- Templates --

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub nav: Nav,
    pub email: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/register.html")]
pub struct RegisterTemplate {
    pub nav: Nav,
    pub name: String,
    pub email: String,
    pub owner_account: bool,
    pub errors: Vec<String>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

// -- Session helpers --

/// Open a session for `user_id` and return the `Set-Cookie` value for it.
pub fn start_session(state: &AppState, conn: &Connection, user_id: &str) -> AppResult<String> {
    let auth = &state.config.auth;
    let token = session::create_session(conn, user_id, auth.session_hours)?;
    Ok(session::session_cookie(&auth.cookie_name, &token, auth.session_hours))
}

/// Delete the session carried by the request, if any, and return the clearing cookie.
pub fn end_session(state: &AppState, parts: &Parts) -> AppResult<String> {
    let cookie_name = &state.config.auth.cookie_name;
    if let Some(token) = session_token(parts, cookie_name) {
        let conn = state.db.get()?;
        session::delete_session(&conn, token)?;
    }
    Ok(session::clear_session_cookie(cookie_name))
}

/// Refuse sign-ups while the `allow_registration` setting is off.
pub fn ensure_registration_open(conn: &Connection) -> AppResult<()> {
    if SiteSettings::load(conn)?.allow_registration {
        Ok(())
    } else {
        Err(AppError::forbidden("Registration is currently closed"))
    }
}

/// Where a freshly signed-in user lands.
fn landing_path(user: &User) -> &'static str {
    if user.is_admin() {
        "/admin"
    } else if user.is_restaurant_owner() {
        "/owner"
    } else {
        "/"
    }
}

// -- Login --

/// GET /login
pub async fn login_page(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
) -> PageResult<Response> {
    if let Some(user) = &maybe_user.0 {
        return Ok(Redirect::to(landing_path(user)).into_response());
    }
    let conn = state.db.get()?;
    let nav = Nav::load(&conn, None)?;
    Ok(Html(LoginTemplate {
        nav,
        email: String::new(),
        error: None,
    })
    .into_response())
}

/// POST /login
pub async fn login_submit(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let (status, error) = match users::authenticate(&conn, &form.email, &form.password) {
        Ok(user) => {
            let cookie = start_session(&state, &conn, &user.id)?;
            tracing::info!(user_id = %user.id, "Signed in");
            return Ok((
                AppendHeaders([(header::SET_COOKIE, cookie)]),
                Redirect::to(landing_path(&user)),
            )
                .into_response());
        }
        Err(AppError::Unauthorized) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "These credentials do not match our records.".to_string(),
        ),
        Err(AppError::Forbidden(msg)) => (StatusCode::FORBIDDEN, msg),
        Err(e) => return Err(e.into()),
    };

    let nav = Nav::load(&conn, None)?;
    let page = Html(LoginTemplate {
        nav,
        email: form.email,
        error: Some(error),
    });
    Ok((status, page).into_response())
}

// -- Registration --

/// GET /register
pub async fn register_page(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
) -> PageResult<Response> {
    if maybe_user.0.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    let conn = state.db.get()?;
    ensure_registration_open(&conn)?;
    let nav = Nav::load(&conn, None)?;
    Ok(Html(RegisterTemplate {
        nav,
        name: String::new(),
        email: String::new(),
        owner_account: false,
        errors: Vec::new(),
    })
    .into_response())
}

/// POST /register
pub async fn register_submit(
    State(state): State<AppState>,
    Form(input): Form<RegisterInput>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    ensure_registration_open(&conn)?;

    let (name, email) = (input.name.clone(), input.email.clone());
    let owner_account = input.account_type == crate::users::domain::AccountType::RestaurantOwner;
    match users::register(&conn, input, state.config.auth.bcrypt_cost) {
        Ok(user) => {
            let cookie = start_session(&state, &conn, &user.id)?;
            Ok((
                AppendHeaders([(header::SET_COOKIE, cookie)]),
                Redirect::to(landing_path(&user)),
            )
                .into_response())
        }
        Err(AppError::Validation(fields)) => {
            let nav = Nav::load(&conn, None)?;
            let page = Html(RegisterTemplate {
                nav,
                name,
                email,
                owner_account,
                errors: fields.into_values().flatten().collect(),
            });
            Ok((StatusCode::UNPROCESSABLE_ENTITY, page).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

// -- Logout --

/// POST /logout
pub async fn logout(State(state): State<AppState>, parts: Parts) -> PageResult<Response> {
    let cookie = end_session(&state, &parts)?;
    Ok((AppendHeaders([(header::SET_COOKIE, cookie)]), Redirect::to("/")).into_response())
}
