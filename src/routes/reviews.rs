use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::post;
use axum::{Form, Router};
use serde::Deserialize;

use crate::extractors::WebUser;
use crate::notifications::Event;
use crate::reviews::domain::{ReviewForm, ReviewInput};
use crate::reviews::repository as reviews;
use crate::reviews::responses::{self, ResponseInput};
use crate::reviews::helpful;
use crate::routes::{redirect_with, PageResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/restaurants/{id}/reviews", post(create))
        .route("/reviews/{id}/edit", post(update))
        .route("/reviews/{id}/delete", post(delete))
        .route("/reviews/{id}/helpful", post(toggle_helpful))
        .route("/reviews/{id}/response", post(respond))
}

fn restaurant_path(restaurant_id: &str) -> String {
    format!("/restaurants/{}", restaurant_id)
}

/// POST /restaurants/{id}/reviews
pub async fn create(
    State(state): State<AppState>,
    user: WebUser,
    Path(restaurant_id): Path<String>,
    Form(form): Form<ReviewForm>,
) -> PageResult<Response> {
    let review = {
        let mut conn = state.db.get()?;
        reviews::create(
            &mut conn,
            &user,
            &restaurant_id,
            ReviewInput::from(form),
            state.aggregate_scope(),
        )?
    };
    state.notifier.dispatch(Event::NewReview {
        review_id: review.id,
    });
    Ok(redirect_with(&restaurant_path(&restaurant_id), "review_submitted"))
}

/// POST /reviews/{id}/edit
pub async fn update(
    State(state): State<AppState>,
    user: WebUser,
    Path(review_id): Path<String>,
    Form(form): Form<ReviewForm>,
) -> PageResult<Response> {
    let mut conn = state.db.get()?;
    let review = reviews::update(
        &mut conn,
        &user,
        &review_id,
        ReviewInput::from(form),
        state.aggregate_scope(),
    )?;
    Ok(redirect_with(&restaurant_path(&review.restaurant_id), "review_updated"))
}

/// POST /reviews/{id}/delete
pub async fn delete(
    State(state): State<AppState>,
    user: WebUser,
    Path(review_id): Path<String>,
) -> PageResult<Response> {
    let (restaurant_id, paths) = {
        let mut conn = state.db.get()?;
        let restaurant_id = reviews::find(&conn, &review_id)?.restaurant_id;
        let paths = reviews::delete(&mut conn, &user, &review_id, state.aggregate_scope())?;
        (restaurant_id, paths)
    };
    state.files.remove_all(&paths).await;
    Ok(redirect_with(&restaurant_path(&restaurant_id), "review_deleted"))
}

/// POST /reviews/{id}/helpful
pub async fn toggle_helpful(
    State(state): State<AppState>,
    user: WebUser,
    Path(review_id): Path<String>,
) -> PageResult<Response> {
    let mut conn = state.db.get()?;
    let vote = helpful::toggle(&mut conn, &user.id, &review_id)?;
    let restaurant_id = reviews::find(&conn, &review_id)?.restaurant_id;
    let notice = if vote.helpful {
        "helpful_added"
    } else {
        "helpful_removed"
    };
    Ok(redirect_with(&restaurant_path(&restaurant_id), notice))
}

#[derive(Debug, Deserialize)]
pub struct ResponseForm {
    #[serde(default)]
    pub response: String,
    /// `delete` removes the reply; anything else saves it.
    #[serde(default)]
    pub action: Option<String>,
}

/// POST /reviews/{id}/response
pub async fn respond(
    State(state): State<AppState>,
    user: WebUser,
    Path(review_id): Path<String>,
    Form(form): Form<ResponseForm>,
) -> PageResult<Response> {
    let conn = state.db.get()?;
    let restaurant_id = reviews::find(&conn, &review_id)?.restaurant_id;
    let back = restaurant_path(&restaurant_id);

    if form.action.as_deref() == Some("delete") {
        responses::delete(&conn, &user, &review_id)?;
        return Ok(redirect_with(&back, "response_deleted"));
    }

    let input = ResponseInput {
        response: form.response,
    };
    if responses::find_for_review(&conn, &review_id)?.is_some() {
        responses::update(&conn, &user, &review_id, input)?;
    } else {
        responses::create(&conn, &user, &review_id, input)?;
        state.notifier.dispatch(Event::OwnerResponse {
            review_id: review_id.clone(),
        });
    }
    Ok(redirect_with(&back, "response_saved"))
}
