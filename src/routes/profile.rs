use askama::Template;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;

use crate::db::models::User;
use crate::error::AppError;
use crate::extractors::{MaybeUser, WebUser};
use crate::restaurants::repository::{self as restaurants, RestaurantCard};
use crate::reviews::repository::{self as reviews, ReviewView};
use crate::routes::{filters, read_upload, redirect_with, Html, Nav, NoticeQuery, PageResult};
use crate::state::AppState;
use crate::users::avatar;
use crate::users::repository::{self as users, ProfileInput};

pub fn router(upload_limit: DefaultBodyLimit) -> Router<AppState> {
    Router::new()
        .route("/profile", get(edit).post(update))
        .route("/profile/avatar", post(upload_avatar).layer(upload_limit))
        .route("/users/{id}", get(show))
}

#[derive(Template)]
#[template(path = "pages/profile.html")]
pub struct EditTemplate {
    pub nav: Nav,
    pub user: User,
    pub reviews: Vec<ReviewView>,
    pub favorites: Vec<RestaurantCard>,
    pub errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "pages/user.html")]
pub struct ShowTemplate {
    pub nav: Nav,
    pub profile: User,
    pub reviews: Vec<ReviewView>,
}

/// Profile form; unchecked checkboxes are simply missing.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ProfileForm {
    pub name: String,
    pub bio: String,
    pub location: String,
    pub is_public: Option<String>,
    pub email_notifications: Option<String>,
}

impl From<ProfileForm> for ProfileInput {
    fn from(form: ProfileForm) -> Self {
        ProfileInput {
            name: form.name,
            bio: Some(form.bio),
            location: Some(form.location),
            is_public: form.is_public.is_some(),
            email_notifications: form.email_notifications.is_some(),
        }
    }
}

/// GET /profile
pub async fn edit(
    State(state): State<AppState>,
    user: WebUser,
    Query(notice): Query<NoticeQuery>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let nav = Nav::load(&conn, Some(&user.0))?.with_notice(&notice);
    Ok(Html(EditTemplate {
        nav,
        reviews: reviews::list_for_user(&conn, &user.id, false, Some(&user.id))?,
        favorites: restaurants::favorites(&conn, &user.id)?,
        user: user.0,
        errors: Vec::new(),
    })
    .into_response())
}

/// POST /profile
pub async fn update(
    State(state): State<AppState>,
    user: WebUser,
    Form(form): Form<ProfileForm>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    match users::update_profile(&conn, &user.id, form.into()) {
        Ok(_) => Ok(redirect_with("/profile", "profile_updated")),
        Err(AppError::Validation(fields)) => {
            let nav = Nav::load(&conn, Some(&user.0))?;
            let page = Html(EditTemplate {
                nav,
                reviews: reviews::list_for_user(&conn, &user.id, false, Some(&user.id))?,
                favorites: restaurants::favorites(&conn, &user.id)?,
                user: user.0,
                errors: fields.into_values().flatten().collect(),
            });
            Ok((StatusCode::UNPROCESSABLE_ENTITY, page).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /profile/avatar
pub async fn upload_avatar(
    State(state): State<AppState>,
    user: WebUser,
    multipart: Multipart,
) -> PageResult<Response> {
    let upload = read_upload(multipart).await?;
    avatar::replace(
        &state.db,
        &state.files,
        state.upload_limits(),
        &user.id,
        upload.files,
    )
    .await?;
    Ok(redirect_with("/profile", "avatar_updated"))
}

/// GET /users/{id}
pub async fn show(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Path(id): Path<String>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let profile = users::find(&conn, &id)?;
    if !users::can_view_profile(&profile, maybe_user.0.as_ref()) {
        return Err(AppError::forbidden("This profile is private").into());
    }
    let nav = Nav::load(&conn, maybe_user.0.as_ref())?;
    let reviews = reviews::list_for_user(&conn, &profile.id, true, maybe_user.id())?;
    Ok(Html(ShowTemplate {
        nav,
        profile,
        reviews,
    })
    .into_response())
}

