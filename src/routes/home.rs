use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::extractors::MaybeUser;
use crate::restaurants::repository::{self as restaurants, RestaurantCard};
use crate::routes::{filters, Nav, NoticeQuery, PageResult};
use crate::settings::SiteSettings;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/home.html")]
pub struct HomeTemplate {
    pub nav: Nav,
    pub site_description: String,
    pub featured: Vec<RestaurantCard>,
    pub cuisines: Vec<String>,
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

/// Format a SQLite `datetime('now')` stamp as a relative time, e.g. "3 days ago".
pub fn format_relative_time(datetime_str: &str) -> String {
    let Ok(dt) = chrono::NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S") else {
        return datetime_str.to_string();
    };
    let now = chrono::Utc::now().naive_utc();
    let seconds = now.signed_duration_since(dt).num_seconds().max(0);

    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {} ago", unit)
        } else {
            format!("{} {}s ago", n, unit)
        }
    };
    match seconds {
        0..=59 => "just now".to_string(),
        60..=3599 => plural(seconds / 60, "minute"),
        3600..=86_399 => plural(seconds / 3600, "hour"),
        86_400..=2_591_999 => plural(seconds / 86_400, "day"),
        _ => dt.format("%b %-d, %Y").to_string(),
    }
}

pub async fn index(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Query(notice): Query<NoticeQuery>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let nav = Nav::load(&conn, maybe_user.0.as_ref())?.with_notice(&notice);
    let settings = SiteSettings::load(&conn)?;

    Ok(Html(HomeTemplate {
        nav,
        site_description: settings.site_description,
        featured: restaurants::featured(&conn, 6)?,
        cuisines: restaurants::cuisines(&conn)?,
    })
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_time_buckets() {
        let now = chrono::Utc::now().naive_utc();
        let stamp = |secs: i64| {
            (now - chrono::Duration::seconds(secs))
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        };
        assert_eq!(format_relative_time(&stamp(5)), "just now");
        assert_eq!(format_relative_time(&stamp(60)), "1 minute ago");
        assert_eq!(format_relative_time(&stamp(7200)), "2 hours ago");
        assert_eq!(format_relative_time(&stamp(3 * 86_400)), "3 days ago");
    }

    #[test]
    fn unparseable_time_is_returned_as_is() {
        assert_eq!(format_relative_time("yesterday"), "yesterday");
    }
}
