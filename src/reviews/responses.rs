//! Owner replies to reviews. A review has at most one reply, written by the
//! owner of the reviewed restaurant.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use validator::Validate;

use crate::db::models::{Review, ReviewResponse, User};
use crate::db::new_id;
use crate::error::{AppError, AppResult};
use crate::reviews::repository as reviews;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResponseInput {
    #[validate(length(min = 1, max = 2000, message = "Response must be 1 to 2000 characters"))]
    pub response: String,
}

impl ResponseInput {
    fn validated(self) -> AppResult<Self> {
        let input = ResponseInput {
            response: self.response.trim().to_string(),
        };
        input.validate()?;
        Ok(input)
    }
}

pub fn find_for_review(conn: &Connection, review_id: &str) -> AppResult<Option<ReviewResponse>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM review_responses WHERE review_id = ?1",
                ReviewResponse::COLUMNS
            ),
            params![review_id],
            ReviewResponse::from_row,
        )
        .optional()?)
}

/// The review, provided `owner` owns the restaurant it is about.
fn owned_review(conn: &Connection, owner: &User, review_id: &str) -> AppResult<Review> {
    let review = reviews::find(conn, review_id)?;
    let owner_id: Option<String> = conn.query_row(
        "SELECT owner_id FROM restaurants WHERE id = ?1",
        params![review.restaurant_id],
        |row| row.get(0),
    )?;
    if owner_id.as_deref() != Some(owner.id.as_str()) {
        return Err(AppError::forbidden(
            "Only the restaurant owner can respond to its reviews",
        ));
    }
    Ok(review)
}

const ALREADY_ANSWERED: &str = "This review already has a response";

pub fn create(conn: &Connection, owner: &User, review_id: &str, input: ResponseInput) -> AppResult<ReviewResponse> {
    let input = input.validated()?;
    owned_review(conn, owner, review_id)?;

    if find_for_review(conn, review_id)?.is_some() {
        return Err(AppError::field("response", ALREADY_ANSWERED));
    }

    let id = new_id();
    conn.execute(
        "INSERT INTO review_responses (id, review_id, user_id, response) VALUES (?1, ?2, ?3, ?4)",
        params![id, review_id, owner.id, input.response],
    )
    .map_err(AppError::unique("response", ALREADY_ANSWERED))?;

    tracing::info!(review_id, owner_id = %owner.id, "Owner responded to review");
    find_for_review(conn, review_id)?.ok_or(AppError::NotFound)
}

pub fn update(conn: &Connection, owner: &User, review_id: &str, input: ResponseInput) -> AppResult<ReviewResponse> {
    let input = input.validated()?;
    owned_review(conn, owner, review_id)?;

    let changed = conn.execute(
        "UPDATE review_responses SET response = ?1, updated_at = datetime('now') WHERE review_id = ?2",
        params![input.response, review_id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    find_for_review(conn, review_id)?.ok_or(AppError::NotFound)
}

pub fn delete(conn: &Connection, owner: &User, review_id: &str) -> AppResult<()> {
    owned_review(conn, owner, review_id)?;

    let removed = conn.execute(
        "DELETE FROM review_responses WHERE review_id = ?1",
        params![review_id],
    )?;
    if removed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}
