pub mod admin;
pub mod api;
pub mod assets;
pub mod auth;
pub mod home;
pub mod owner;
pub mod profile;
pub mod restaurants;
pub mod reviews;

use askama::Template;
use axum::extract::{DefaultBodyLimit, Multipart};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use rusqlite::Connection;
use serde::Deserialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::images::domain::UploadedFile;
use crate::notifications;
use crate::settings::SiteSettings;
use crate::state::AppState;

pub use home::Html;

/// The whole application: HTML pages, the JSON API, assets and uploads.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home::index))
        .route("/assets/{*path}", get(assets::serve))
        .merge(auth::router())
        .merge(restaurants::router())
        .merge(reviews::router())
        .merge(profile::router(upload_body_limit(&state)))
        .merge(owner::router())
        .merge(admin::router())
        .nest("/api", api::router(upload_body_limit(&state)))
        .nest_service("/uploads", ServeDir::new(state.files.root()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Room for a full batch of maximum-size files plus multipart framing.
fn upload_body_limit(state: &AppState) -> DefaultBodyLimit {
    let storage = &state.config.storage;
    DefaultBodyLimit::max(storage.max_files * storage.max_file_bytes + 1024 * 1024)
}

/// What every page's header needs to know about the visitor.
#[derive(Debug, Clone)]
pub struct Nav {
    pub site_name: String,
    pub signed_in: bool,
    pub user_id: String,
    pub user_name: String,
    pub is_admin: bool,
    pub is_owner: bool,
    pub unread: i64,
    pub notice: String,
}

impl Nav {
    pub fn load(conn: &Connection, user: Option<&User>) -> AppResult<Self> {
        let settings = SiteSettings::load(conn)?;
        let mut nav = Nav {
            site_name: settings.site_name,
            ..Nav::anonymous()
        };
        if let Some(user) = user {
            nav.signed_in = true;
            nav.user_id = user.id.clone();
            nav.user_name = user.name.clone();
            nav.is_admin = user.is_admin();
            nav.is_owner = user.is_restaurant_owner();
            nav.unread = notifications::unread_count(conn, &user.id)?;
        }
        Ok(nav)
    }

    /// Header for pages rendered without database access.
    pub fn anonymous() -> Self {
        Nav {
            site_name: "Forkful".to_string(),
            signed_in: false,
            user_id: String::new(),
            user_name: String::new(),
            is_admin: false,
            is_owner: false,
            unread: 0,
            notice: String::new(),
        }
    }

    pub fn with_notice(mut self, notice: &NoticeQuery) -> Self {
        self.notice = notice.text().unwrap_or_default().to_string();
        self
    }
}

/// `?notice=` codes set by form handlers after a redirect.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NoticeQuery {
    pub notice: Option<String>,
}

impl NoticeQuery {
    pub fn text(&self) -> Option<&'static str> {
        let text = match self.notice.as_deref()? {
            "review_submitted" => "Thanks! Your review is awaiting moderation.",
            "review_updated" => "Your review was updated and is awaiting moderation again.",
            "review_deleted" => "Review deleted.",
            "profile_updated" => "Profile saved.",
            "avatar_updated" => "Avatar updated.",
            "restaurant_saved" => "Restaurant saved.",
            "restaurant_deleted" => "Restaurant deleted.",
            "favorite_added" => "Added to your favorites.",
            "favorite_removed" => "Removed from your favorites.",
            "helpful_added" => "Marked as helpful.",
            "helpful_removed" => "Helpful vote removed.",
            "claimed" => "You now manage this restaurant.",
            "response_saved" => "Response saved.",
            "response_deleted" => "Response deleted.",
            "settings_saved" => "Settings saved.",
            "user_banned" => "User banned.",
            "user_unbanned" => "User reinstated.",
            "user_deleted" => "User deleted.",
            "review_approved" => "Review approved.",
            "review_rejected" => "Review rejected.",
            _ => return None,
        };
        Some(text)
    }
}

/// Redirect after a form post, carrying a notice code.
pub fn redirect_with(path: &str, notice: &str) -> Response {
    let sep = if path.contains('?') { '&' } else { '?' };
    Redirect::to(&format!("{}{}notice={}", path, sep, notice)).into_response()
}

/// Files of a multipart upload plus its optional `primary_index` field.
#[derive(Debug, Default)]
pub struct Upload {
    pub files: Vec<UploadedFile>,
    pub primary_index: usize,
}

/// Collect every file part of a multipart body. Empty file inputs are skipped.
pub async fn read_upload(mut multipart: Multipart) -> AppResult<Upload> {
    let mut upload = Upload::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() == Some("primary_index") {
            let raw = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            upload.primary_index = raw
                .trim()
                .parse()
                .map_err(|_| AppError::field("primary_index", "Must be a whole number"))?;
            continue;
        }

        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        if file_name.is_empty() && bytes.is_empty() {
            continue;
        }
        upload
            .files
            .push(UploadedFile::new(Some(file_name), content_type, bytes.to_vec()));
    }
    Ok(upload)
}

/// Template filters; route modules `use crate::routes::filters` next to their templates.
pub mod filters {
    use std::fmt::Display;

    /// `{{ review.created_at|ago }}`
    pub fn ago<T: Display>(stamp: T) -> askama::Result<String> {
        Ok(super::home::format_relative_time(&stamp.to_string()))
    }

    /// Five-star bar for a 0 to 5 rating, rounded to the nearest star.
    pub fn stars<T: Display>(rating: T) -> askama::Result<String> {
        let value: f64 = rating.to_string().parse().unwrap_or(0.0);
        let filled = value.round().clamp(0.0, 5.0) as usize;
        Ok(format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled)))
    }
}

#[derive(Template)]
#[template(path = "pages/error.html")]
pub struct ErrorTemplate {
    pub nav: Nav,
    pub status: u16,
    pub title: String,
    pub messages: Vec<String>,
}

/// Errors from HTML handlers render a page instead of the JSON envelope.
#[derive(Debug)]
pub struct PageError(pub AppError);

pub type PageResult<T> = Result<T, PageError>;

impl From<AppError> for PageError {
    fn from(e: AppError) -> Self {
        PageError(e)
    }
}

impl From<r2d2::Error> for PageError {
    fn from(e: r2d2::Error) -> Self {
        PageError(e.into())
    }
}

impl From<rusqlite::Error> for PageError {
    fn from(e: rusqlite::Error) -> Self {
        PageError(e.into())
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        if matches!(self.0, AppError::Unauthorized) {
            return Redirect::to("/login").into_response();
        }
        let (status, message, fields) = self.0.describe();
        let mut messages: Vec<String> = fields
            .map(|f| f.into_values().flatten().collect())
            .unwrap_or_default();
        if messages.is_empty() {
            messages.push(message.clone());
        }
        let title = match status {
            StatusCode::NOT_FOUND => "Page not found".to_string(),
            StatusCode::FORBIDDEN => "Not allowed".to_string(),
            StatusCode::UNPROCESSABLE_ENTITY => "Please check your input".to_string(),
            _ => "Something went wrong".to_string(),
        };
        let page = Html(ErrorTemplate {
            nav: Nav::anonymous(),
            status: status.as_u16(),
            title,
            messages,
        });
        (status, page).into_response()
    }
}
