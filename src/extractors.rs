use std::ops::Deref;

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};

use crate::auth::session;
use crate::db::models::User;
use crate::error::AppError;
use crate::state::AppState;
use crate::users::repository as users;

/// The signed-in user.
/// Returns 401 without a live session and 403 when the account is banned.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl Deref for CurrentUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(parts, &state.config.auth.cookie_name)
            .ok_or(AppError::Unauthorized)?;

        let conn = state.db.get()?;
        let user_id = session::session_user(&conn, token)?.ok_or(AppError::Unauthorized)?;
        let user = match users::find(&conn, &user_id) {
            Ok(user) => user,
            Err(AppError::NotFound) => return Err(AppError::Unauthorized),
            Err(e) => return Err(e),
        };

        if !user.is_active {
            return Err(AppError::forbidden("Your account has been suspended"));
        }
        Ok(CurrentUser(user))
    }
}

/// Optional user extractor, `None` instead of 401/403.
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn id(&self) -> Option<&str> {
        self.0.as_ref().map(|u| u.id.as_str())
    }

    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(User::is_admin)
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user.0))),
            Err(AppError::Unauthorized) | Err(AppError::Forbidden(_)) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

/// A signed-in administrator; 403 for everyone else.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl Deref for AdminUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::forbidden("Administrators only"));
        }
        Ok(AdminUser(user.0))
    }
}

/// HTML pages send visitors without a session to the login form instead of a 401.
pub struct WebUser(pub User);

impl Deref for WebUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

impl FromRequestParts<AppState> for WebUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(WebUser(user.0)),
            Err(e) => Err(web_rejection(e)),
        }
    }
}

/// Admin pages; visitors go to the login form, signed-in non-admins get a 403 page.
pub struct WebAdmin(pub User);

impl Deref for WebAdmin {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

impl FromRequestParts<AppState> for WebAdmin {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match AdminUser::from_request_parts(parts, state).await {
            Ok(admin) => Ok(WebAdmin(admin.0)),
            Err(e) => Err(web_rejection(e)),
        }
    }
}

fn web_rejection(error: AppError) -> Response {
    match error {
        AppError::Unauthorized => Redirect::to("/login").into_response(),
        other => crate::routes::PageError(other).into_response(),
    }
}

/// Value of the session cookie, if the request carries one.
pub fn session_token<'a>(parts: &'a Parts, cookie_name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == cookie_name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}
