use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::Value;

use crate::error::AppResult;
use crate::extractors::AdminUser;
use crate::moderation::{self, ReviewFilters};
use crate::restaurants::repository::{self as restaurants, RestaurantInput};
use crate::reviews::domain::Moderation;
use crate::routes::admin::{RestaurantQuery, ADMIN_PER_PAGE};
use crate::routes::api::{created, message, ok, ok_with};
use crate::settings;
use crate::state::AppState;
use crate::users::repository::{self as users, UserFilters};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/stats", get(stats))
        .route("/admin/users", get(users_index))
        .route("/admin/users/{id}", delete(delete_user))
        .route("/admin/users/{id}/ban", post(ban_user))
        .route("/admin/users/{id}/unban", post(unban_user))
        .route(
            "/admin/restaurants",
            get(restaurants_index).post(create_restaurant),
        )
        .route(
            "/admin/restaurants/{id}",
            get(show_restaurant)
                .put(update_restaurant)
                .delete(delete_restaurant),
        )
        .route("/admin/restaurants/{id}/toggle", post(toggle_restaurant))
        .route("/admin/reviews", get(reviews_index))
        .route("/admin/reviews/{id}/approve", post(approve_review))
        .route("/admin/reviews/{id}/reject", post(reject_review))
        .route("/admin/settings", get(settings_index).put(update_settings))
}

/// GET /api/admin/stats
pub async fn stats(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(ok(moderation::dashboard_stats(&conn)?))
}

// -- Users --

/// GET /api/admin/users
pub async fn users_index(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(filters): Query<UserFilters>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(ok(users::admin_list(&conn, filters, ADMIN_PER_PAGE)?))
}

/// POST /api/admin/users/{id}/ban
pub async fn ban_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(ok_with("User banned", moderation::ban(&conn, &admin, &id)?))
}

/// POST /api/admin/users/{id}/unban
pub async fn unban_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(ok_with("User unbanned", moderation::unban(&conn, &admin, &id)?))
}

/// DELETE /api/admin/users/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let paths = {
        let mut conn = state.db.get()?;
        moderation::delete_user(&mut conn, &admin, &id, state.aggregate_scope())?
    };
    state.files.remove_all(&paths).await;
    Ok(message("User deleted"))
}

// -- Restaurants --

/// GET /api/admin/restaurants
pub async fn restaurants_index(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<RestaurantQuery>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let active = query.active()?;
    Ok(ok(restaurants::admin_list(
        &conn,
        query.search,
        active,
        query.page,
        ADMIN_PER_PAGE,
    )?))
}

/// GET /api/admin/restaurants/{id}
pub async fn show_restaurant(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(ok(restaurants::find(&conn, &id)?))
}

/// POST /api/admin/restaurants
pub async fn create_restaurant(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<RestaurantInput>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(created("Restaurant created", restaurants::create(&conn, input)?))
}

/// PUT /api/admin/restaurants/{id}
pub async fn update_restaurant(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(input): Json<RestaurantInput>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(ok_with(
        "Restaurant updated",
        restaurants::update(&conn, &id, input)?,
    ))
}

/// POST /api/admin/restaurants/{id}/toggle
pub async fn toggle_restaurant(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let restaurant = restaurants::toggle_active(&conn, &id)?;
    let text = if restaurant.is_active {
        "Restaurant activated"
    } else {
        "Restaurant deactivated"
    };
    Ok(ok_with(text, restaurant))
}

/// DELETE /api/admin/restaurants/{id}
pub async fn delete_restaurant(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let paths = {
        let mut conn = state.db.get()?;
        restaurants::delete(&mut conn, &id)?
    };
    state.files.remove_all(&paths).await;
    Ok(message("Restaurant deleted"))
}

// -- Reviews --

/// GET /api/admin/reviews
pub async fn reviews_index(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(filters): Query<ReviewFilters>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(ok(moderation::admin_reviews(&conn, filters, ADMIN_PER_PAGE)?))
}

async fn moderate(state: &AppState, id: &str, action: Moderation, text: &str) -> AppResult<Response> {
    let mut conn = state.db.get()?;
    let review = moderation::moderate(&mut conn, id, action, state.aggregate_scope())?;
    Ok(ok_with(text, review))
}

/// POST /api/admin/reviews/{id}/approve
pub async fn approve_review(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    moderate(&state, &id, Moderation::Approve, "Review approved").await
}

/// POST /api/admin/reviews/{id}/reject
pub async fn reject_review(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    moderate(&state, &id, Moderation::Reject, "Review rejected").await
}

// -- Settings --

/// GET /api/admin/settings
pub async fn settings_index(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(ok(settings::all(&conn)?))
}

/// PUT /api/admin/settings
pub async fn update_settings(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(changes): Json<BTreeMap<String, Value>>,
) -> AppResult<Response> {
    let mut conn = state.db.get()?;
    Ok(ok_with("Settings saved", settings::update(&mut conn, changes)?))
}
