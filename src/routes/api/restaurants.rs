use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::models::{Image, Restaurant};
use crate::error::AppResult;
use crate::extractors::{CurrentUser, MaybeUser};
use crate::images::domain::Imageable;
use crate::images::repository as images;
use crate::notifications::Event;
use crate::pagination::Page;
use crate::restaurants::domain::RestaurantFilters;
use crate::restaurants::repository as restaurants;
use crate::reviews::domain::ReviewInput;
use crate::reviews::repository::{self as reviews, ReviewView};
use crate::routes::api::{created, ok};
use crate::settings::SiteSettings;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/restaurants", get(index))
        .route("/restaurants/cuisines", get(cuisines))
        .route("/restaurants/{id}", get(show))
        .route(
            "/restaurants/{id}/reviews",
            get(reviews_index).post(create_review),
        )
}

#[derive(Debug, Serialize)]
pub struct RestaurantDetail {
    pub restaurant: Restaurant,
    pub images: Vec<Image>,
    pub reviews: Page<ReviewView>,
    pub is_favorite: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct PageQuery {
    pub page: Option<u32>,
}

/// GET /api/restaurants
pub async fn index(
    State(state): State<AppState>,
    Query(filters): Query<RestaurantFilters>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let per_page = SiteSettings::load(&conn)?.restaurants_per_page;
    Ok(ok(restaurants::list(&conn, filters, per_page)?))
}

/// GET /api/restaurants/cuisines
pub async fn cuisines(State(state): State<AppState>) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(ok(restaurants::cuisines(&conn)?))
}

/// GET /api/restaurants/{id}
pub async fn show(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let restaurant = restaurants::find_visible(&conn, &id, maybe_user.is_admin())?;
    let per_page = SiteSettings::load(&conn)?.reviews_per_page;
    let is_favorite = match maybe_user.id() {
        Some(user_id) => restaurants::is_favorite(&conn, user_id, &id)?,
        None => false,
    };
    Ok(ok(RestaurantDetail {
        images: images::list(&conn, &Imageable::Restaurant(id.clone()))?,
        reviews: reviews::list_for_restaurant(&conn, &id, maybe_user.id(), None, per_page)?,
        restaurant,
        is_favorite,
    }))
}

/// GET /api/restaurants/{id}/reviews
pub async fn reviews_index(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    restaurants::find_visible(&conn, &id, maybe_user.is_admin())?;
    let per_page = SiteSettings::load(&conn)?.reviews_per_page;
    Ok(ok(reviews::list_for_restaurant(
        &conn,
        &id,
        maybe_user.id(),
        query.page,
        per_page,
    )?))
}

/// POST /api/restaurants/{id}/reviews
pub async fn create_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(input): Json<ReviewInput>,
) -> AppResult<Response> {
    let review = {
        let mut conn = state.db.get()?;
        reviews::create(&mut conn, &user, &id, input, state.aggregate_scope())?
    };
    state.notifier.dispatch(Event::NewReview {
        review_id: review.id.clone(),
    });
    Ok(created("Review submitted and awaiting moderation", review))
}
