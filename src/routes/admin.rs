use std::collections::{BTreeMap, HashMap};

use askama::Template;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use serde_json::Value;

use crate::db::models::{Restaurant, User};
use crate::error::AppError;
use crate::extractors::WebAdmin;
use crate::moderation::{self, DashboardStats, ReviewFilters};
use crate::pagination::Page;
use crate::restaurants::domain::PriceRange;
use crate::restaurants::repository::{self as restaurants, RestaurantCard, RestaurantForm};
use crate::reviews::domain::Moderation;
use crate::reviews::repository::ReviewView;
use crate::routes::{filters, redirect_with, Html, Nav, NoticeQuery, PageResult};
use crate::settings;
use crate::state::AppState;
use crate::users::repository::{self as users, UserFilters};

pub const ADMIN_PER_PAGE: u32 = 20;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin", get(dashboard))
        .route("/admin/users", get(users_index))
        .route("/admin/users/{id}/ban", post(ban_user))
        .route("/admin/users/{id}/unban", post(unban_user))
        .route("/admin/users/{id}/delete", post(delete_user))
        .route(
            "/admin/restaurants",
            get(restaurants_index).post(create_restaurant),
        )
        .route("/admin/restaurants/{id}", post(update_restaurant))
        .route("/admin/restaurants/{id}/edit", get(edit_restaurant))
        .route("/admin/restaurants/{id}/toggle", post(toggle_restaurant))
        .route("/admin/restaurants/{id}/delete", post(delete_restaurant))
        .route("/admin/reviews", get(reviews_index))
        .route("/admin/reviews/{id}/approve", post(approve_review))
        .route("/admin/reviews/{id}/reject", post(reject_review))
        .route("/admin/settings", get(settings_page).post(save_settings))
}

// -- Templates --

#[derive(Template)]
#[template(path = "pages/admin/dashboard.html")]
pub struct DashboardTemplate {
    pub nav: Nav,
    pub stats: DashboardStats,
}

#[derive(Template)]
#[template(path = "pages/admin/users.html")]
pub struct UsersTemplate {
    pub nav: Nav,
    pub page: Page<User>,
    pub search: String,
    pub role: String,
    pub status: String,
}

#[derive(Template)]
#[template(path = "pages/admin/restaurants.html")]
pub struct RestaurantsTemplate {
    pub nav: Nav,
    pub page: Page<RestaurantCard>,
    pub search: String,
    pub status: String,
    pub price_ranges: Vec<&'static str>,
}

#[derive(Template)]
#[template(path = "pages/admin/restaurant_edit.html")]
pub struct RestaurantEditTemplate {
    pub nav: Nav,
    pub restaurant: Restaurant,
    pub price_ranges: Vec<&'static str>,
}

impl RestaurantEditTemplate {
    pub fn features(&self) -> String {
        self.restaurant.features.join(", ")
    }

    pub fn coordinate(&self, value: &Option<f64>) -> String {
        value.map(|v| v.to_string()).unwrap_or_default()
    }
}

#[derive(Template)]
#[template(path = "pages/admin/reviews.html")]
pub struct ReviewsTemplate {
    pub nav: Nav,
    pub page: Page<ReviewView>,
    pub status: String,
    pub search: String,
}

#[derive(Template)]
#[template(path = "pages/admin/settings.html")]
pub struct SettingsTemplate {
    pub nav: Nav,
    pub values: BTreeMap<String, Value>,
    pub errors: Vec<String>,
}

impl SettingsTemplate {
    /// Setting as form text; strings lose their JSON quotes.
    pub fn text(&self, key: &str) -> String {
        match self.values.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    pub fn checked(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(Value::Bool(true)))
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

// -- Dashboard --

/// GET /admin
pub async fn dashboard(
    State(state): State<AppState>,
    admin: WebAdmin,
    Query(notice): Query<NoticeQuery>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let nav = Nav::load(&conn, Some(&admin.0))?.with_notice(&notice);
    Ok(Html(DashboardTemplate {
        nav,
        stats: moderation::dashboard_stats(&conn)?,
    })
    .into_response())
}

// -- Users --

/// GET /admin/users
pub async fn users_index(
    State(state): State<AppState>,
    admin: WebAdmin,
    Query(filters): Query<UserFilters>,
    Query(notice): Query<NoticeQuery>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let nav = Nav::load(&conn, Some(&admin.0))?.with_notice(&notice);
    let (search, role, status) = (
        text(&filters.search),
        text(&filters.role),
        text(&filters.status),
    );
    Ok(Html(UsersTemplate {
        nav,
        page: users::admin_list(&conn, filters, ADMIN_PER_PAGE)?,
        search,
        role,
        status,
    })
    .into_response())
}

/// POST /admin/users/{id}/ban
pub async fn ban_user(
    State(state): State<AppState>,
    admin: WebAdmin,
    Path(id): Path<String>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    moderation::ban(&conn, &admin, &id)?;
    Ok(redirect_with("/admin/users", "user_banned"))
}

/// POST /admin/users/{id}/unban
pub async fn unban_user(
    State(state): State<AppState>,
    admin: WebAdmin,
    Path(id): Path<String>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    moderation::unban(&conn, &admin, &id)?;
    Ok(redirect_with("/admin/users", "user_unbanned"))
}

/// POST /admin/users/{id}/delete
pub async fn delete_user(
    State(state): State<AppState>,
    admin: WebAdmin,
    Path(id): Path<String>,
) -> PageResult<Response> {
    let paths = {
        let mut conn = state.db.get()?;
        moderation::delete_user(&mut conn, &admin, &id, state.aggregate_scope())?
    };
    state.files.remove_all(&paths).await;
    Ok(redirect_with("/admin/users", "user_deleted"))
}

// -- Restaurants --

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RestaurantQuery {
    pub search: Option<String>,
    /// `active`, `inactive` or blank for all
    pub status: Option<String>,
    pub page: Option<u32>,
}

impl RestaurantQuery {
    pub fn active(&self) -> Result<Option<bool>, AppError> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some("active") => Ok(Some(true)),
            Some("inactive") => Ok(Some(false)),
            Some(_) => Err(AppError::field("status", "Status must be active or inactive")),
        }
    }
}

/// GET /admin/restaurants
pub async fn restaurants_index(
    State(state): State<AppState>,
    admin: WebAdmin,
    Query(query): Query<RestaurantQuery>,
    Query(notice): Query<NoticeQuery>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let nav = Nav::load(&conn, Some(&admin.0))?.with_notice(&notice);
    let active = query.active()?;
    let (search, status) = (text(&query.search), text(&query.status));
    Ok(Html(RestaurantsTemplate {
        nav,
        page: restaurants::admin_list(&conn, query.search, active, query.page, ADMIN_PER_PAGE)?,
        search,
        status,
        price_ranges: PriceRange::ALL.iter().map(PriceRange::as_str).collect(),
    })
    .into_response())
}

/// POST /admin/restaurants
pub async fn create_restaurant(
    State(state): State<AppState>,
    _admin: WebAdmin,
    Form(form): Form<RestaurantForm>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let restaurant = restaurants::create(&conn, form.into_input(Default::default())?)?;
    Ok(redirect_with(
        &format!("/admin/restaurants/{}/edit", restaurant.id),
        "restaurant_saved",
    ))
}

/// GET /admin/restaurants/{id}/edit
pub async fn edit_restaurant(
    State(state): State<AppState>,
    admin: WebAdmin,
    Path(id): Path<String>,
    Query(notice): Query<NoticeQuery>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let nav = Nav::load(&conn, Some(&admin.0))?.with_notice(&notice);
    Ok(Html(RestaurantEditTemplate {
        nav,
        restaurant: restaurants::find(&conn, &id)?,
        price_ranges: PriceRange::ALL.iter().map(PriceRange::as_str).collect(),
    })
    .into_response())
}

/// POST /admin/restaurants/{id}
pub async fn update_restaurant(
    State(state): State<AppState>,
    _admin: WebAdmin,
    Path(id): Path<String>,
    Form(form): Form<RestaurantForm>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let hours = restaurants::find(&conn, &id)?.hours;
    restaurants::update(&conn, &id, form.into_input(hours)?)?;
    Ok(redirect_with(
        &format!("/admin/restaurants/{}/edit", id),
        "restaurant_saved",
    ))
}

/// POST /admin/restaurants/{id}/toggle
pub async fn toggle_restaurant(
    State(state): State<AppState>,
    _admin: WebAdmin,
    Path(id): Path<String>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    restaurants::toggle_active(&conn, &id)?;
    Ok(redirect_with("/admin/restaurants", "restaurant_saved"))
}

/// POST /admin/restaurants/{id}/delete
pub async fn delete_restaurant(
    State(state): State<AppState>,
    _admin: WebAdmin,
    Path(id): Path<String>,
) -> PageResult<Response> {
    let paths = {
        let mut conn = state.db.get()?;
        restaurants::delete(&mut conn, &id)?
    };
    state.files.remove_all(&paths).await;
    Ok(redirect_with("/admin/restaurants", "restaurant_deleted"))
}

// -- Reviews --

/// GET /admin/reviews
pub async fn reviews_index(
    State(state): State<AppState>,
    admin: WebAdmin,
    Query(filters): Query<ReviewFilters>,
    Query(notice): Query<NoticeQuery>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let nav = Nav::load(&conn, Some(&admin.0))?.with_notice(&notice);
    let (status, search) = (text(&filters.status), text(&filters.search));
    Ok(Html(ReviewsTemplate {
        nav,
        page: moderation::admin_reviews(&conn, filters, ADMIN_PER_PAGE)?,
        status,
        search,
    })
    .into_response())
}

async fn moderate(state: &AppState, id: &str, action: Moderation) -> PageResult<()> {
    let mut conn = state.db.get()?;
    moderation::moderate(&mut conn, id, action, state.aggregate_scope())?;
    Ok(())
}

/// POST /admin/reviews/{id}/approve
pub async fn approve_review(
    State(state): State<AppState>,
    _admin: WebAdmin,
    Path(id): Path<String>,
) -> PageResult<Response> {
    moderate(&state, &id, Moderation::Approve).await?;
    Ok(redirect_with("/admin/reviews", "review_approved"))
}

/// POST /admin/reviews/{id}/reject
pub async fn reject_review(
    State(state): State<AppState>,
    _admin: WebAdmin,
    Path(id): Path<String>,
) -> PageResult<Response> {
    moderate(&state, &id, Moderation::Reject).await?;
    Ok(redirect_with("/admin/reviews", "review_rejected"))
}

// -- Settings --

/// GET /admin/settings
pub async fn settings_page(
    State(state): State<AppState>,
    admin: WebAdmin,
    Query(notice): Query<NoticeQuery>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let nav = Nav::load(&conn, Some(&admin.0))?.with_notice(&notice);
    Ok(Html(SettingsTemplate {
        nav,
        values: settings::all(&conn)?,
        errors: Vec::new(),
    })
    .into_response())
}

/// POST /admin/settings
pub async fn save_settings(
    State(state): State<AppState>,
    admin: WebAdmin,
    Form(form): Form<HashMap<String, String>>,
) -> PageResult<Response> {
    let mut conn = state.db.get()?;
    match settings::update(&mut conn, settings::from_form(form)) {
        Ok(_) => Ok(redirect_with("/admin/settings", "settings_saved")),
        Err(AppError::Validation(fields)) => {
            let nav = Nav::load(&conn, Some(&admin.0))?;
            let errors = fields
                .into_iter()
                .flat_map(|(key, messages)| {
                    messages.into_iter().map(move |m| format!("{}: {}", key, m))
                })
                .collect();
            let page = Html(SettingsTemplate {
                nav,
                values: settings::all(&conn)?,
                errors,
            });
            Ok((StatusCode::UNPROCESSABLE_ENTITY, page).into_response())
        }
        Err(e) => Err(e.into()),
    }
}
