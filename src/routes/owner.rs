use askama::Template;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};

use crate::extractors::WebUser;
use crate::owner::{self, OwnerDashboard};
use crate::restaurants::domain::PriceRange;
use crate::restaurants::repository::{self as restaurants, RestaurantCard, RestaurantForm};
use crate::routes::{filters, redirect_with, Html, Nav, NoticeQuery, PageResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/owner", get(dashboard))
        .route("/owner/claim", get(claim_page))
        .route("/owner/claim/{id}", post(claim))
        .route("/owner/restaurant", post(update_restaurant))
}

#[derive(Template)]
#[template(path = "pages/owner_dashboard.html")]
pub struct DashboardTemplate {
    pub nav: Nav,
    pub dashboard: OwnerDashboard,
    pub price_ranges: Vec<&'static str>,
}

impl DashboardTemplate {
    /// Width of a histogram bar, as a percentage of the busiest bucket.
    pub fn bar_width(&self, count: &i64) -> i64 {
        let max = self.dashboard.rating_histogram.iter().copied().max().unwrap_or(0);
        if max == 0 {
            0
        } else {
            count * 100 / max
        }
    }
}

#[derive(Template)]
#[template(path = "pages/owner_claim.html")]
pub struct ClaimTemplate {
    pub nav: Nav,
    pub restaurants: Vec<RestaurantCard>,
}

/// GET /owner
pub async fn dashboard(
    State(state): State<AppState>,
    user: WebUser,
    Query(notice): Query<NoticeQuery>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let Some(dashboard) = owner::dashboard(&conn, &user)? else {
        return Ok(Redirect::to("/owner/claim").into_response());
    };
    let nav = Nav::load(&conn, Some(&user.0))?.with_notice(&notice);
    Ok(Html(DashboardTemplate {
        nav,
        dashboard,
        price_ranges: PriceRange::ALL.iter().map(PriceRange::as_str).collect(),
    })
    .into_response())
}

/// GET /owner/claim
pub async fn claim_page(State(state): State<AppState>, user: WebUser) -> PageResult<Response> {
    if user.restaurant_id.is_some() {
        return Ok(Redirect::to("/owner").into_response());
    }
    let conn = state.db.get()?;
    let nav = Nav::load(&conn, Some(&user.0))?;
    Ok(Html(ClaimTemplate {
        nav,
        restaurants: owner::claimable(&conn)?,
    })
    .into_response())
}

/// POST /owner/claim/{id}
pub async fn claim(
    State(state): State<AppState>,
    user: WebUser,
    Path(restaurant_id): Path<String>,
) -> PageResult<Response> {
    let mut conn = state.db.get()?;
    owner::claim(&mut conn, &user.id, &restaurant_id)?;
    Ok(redirect_with("/owner", "claimed"))
}

/// POST /owner/restaurant
pub async fn update_restaurant(
    State(state): State<AppState>,
    user: WebUser,
    Form(form): Form<RestaurantForm>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let hours = match user.restaurant_id.as_deref() {
        Some(id) => restaurants::find(&conn, id)?.hours,
        None => Default::default(),
    };
    owner::update_restaurant(&conn, &user, form.into_input(hours)?)?;
    Ok(redirect_with("/owner", "restaurant_saved"))
}
