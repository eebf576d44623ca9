use askama::Template;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use crate::db::models::{Image, Restaurant, Review};
use crate::extractors::{MaybeUser, WebUser};
use crate::images::domain::Imageable;
use crate::images::repository as images;
use crate::pagination::Page;
use crate::restaurants::domain::{PriceRange, RestaurantFilters};
use crate::restaurants::repository::{self as restaurants, RestaurantCard};
use crate::reviews::repository::{self as reviews, ReviewView};
use crate::routes::{filters, redirect_with, Html, Nav, NoticeQuery, PageResult};
use crate::settings::SiteSettings;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/restaurants", get(index))
        .route("/restaurants/{id}", get(show))
        .route("/restaurants/{id}/favorite", post(toggle_favorite))
}

#[derive(Template)]
#[template(path = "pages/restaurants.html")]
pub struct IndexTemplate {
    pub nav: Nav,
    pub page: Page<RestaurantCard>,
    pub cuisines: Vec<String>,
    pub price_ranges: Vec<&'static str>,
    pub search: String,
    pub cuisine: String,
    pub price_range: String,
    pub location: String,
    pub min_rating: String,
    pub sort: String,
    /// Current filters as a query string, without `page`.
    pub query: String,
}

#[derive(Template)]
#[template(path = "pages/restaurant.html")]
pub struct ShowTemplate {
    pub nav: Nav,
    pub restaurant: Restaurant,
    pub images: Vec<Image>,
    pub reviews: Page<ReviewView>,
    pub is_favorite: bool,
    pub own_review: Option<Review>,
    pub manages: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SortParam {
    pub sort: Option<String>,
}

fn encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

/// GET /restaurants
pub async fn index(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Query(filters): Query<RestaurantFilters>,
    Query(sort): Query<SortParam>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let nav = Nav::load(&conn, maybe_user.0.as_ref())?;
    let per_page = SiteSettings::load(&conn)?.restaurants_per_page;

    let text = |v: &Option<String>| RestaurantFilters::non_empty(v).unwrap_or_default().to_string();
    let search = text(&filters.search);
    let cuisine = text(&filters.cuisine);
    let price_range = text(&filters.price_range);
    let location = text(&filters.location);
    let min_rating = filters.min_rating.map(|r| r.to_string()).unwrap_or_default();
    let sort = sort.sort.unwrap_or_default();

    let query: String = [
        ("search", &search),
        ("cuisine", &cuisine),
        ("price_range", &price_range),
        ("location", &location),
        ("min_rating", &min_rating),
        ("sort", &sort),
    ]
    .iter()
    .filter(|(_, v)| !v.is_empty())
    .map(|(k, v)| format!("{}={}&", k, encode(v)))
    .collect();

    let page = restaurants::list(&conn, filters, per_page)?;
    Ok(Html(IndexTemplate {
        nav,
        page,
        cuisines: restaurants::cuisines(&conn)?,
        price_ranges: PriceRange::ALL.iter().map(PriceRange::as_str).collect(),
        search,
        cuisine,
        price_range,
        location,
        min_rating,
        sort,
        query,
    })
    .into_response())
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ShowQuery {
    pub page: Option<u32>,
    pub notice: Option<String>,
}

/// GET /restaurants/{id}
pub async fn show(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Path(id): Path<String>,
    Query(query): Query<ShowQuery>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let restaurant = restaurants::find_visible(&conn, &id, maybe_user.is_admin())?;
    let notice = NoticeQuery {
        notice: query.notice,
    };
    let nav = Nav::load(&conn, maybe_user.0.as_ref())?.with_notice(&notice);
    let per_page = SiteSettings::load(&conn)?.reviews_per_page;

    let (is_favorite, own_review) = match maybe_user.id() {
        Some(user_id) => (
            restaurants::is_favorite(&conn, user_id, &id)?,
            reviews::find_by_author(&conn, user_id, &id)?,
        ),
        None => (false, None),
    };
    let manages = maybe_user.id().is_some() && restaurant.owner_id.as_deref() == maybe_user.id();

    Ok(Html(ShowTemplate {
        images: images::list(&conn, &Imageable::Restaurant(id.clone()))?,
        reviews: reviews::list_for_restaurant(&conn, &id, maybe_user.id(), query.page, per_page)?,
        nav,
        restaurant,
        is_favorite,
        own_review,
        manages,
    })
    .into_response())
}

/// POST /restaurants/{id}/favorite
pub async fn toggle_favorite(
    State(state): State<AppState>,
    user: WebUser,
    Path(id): Path<String>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let now_favorite = restaurants::toggle_favorite(&conn, &user.id, &id)?;
    let notice = if now_favorite {
        "favorite_added"
    } else {
        "favorite_removed"
    };
    Ok(redirect_with(&format!("/restaurants/{}", id), notice))
}
