use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::config::AggregateScope;
use crate::db::models::{Image, Review, ReviewResponse, User};
use crate::db::new_id;
use crate::error::{AppError, AppResult};
use crate::images::domain::Imageable;
use crate::images::repository as images;
use crate::pagination::{Page, PageRequest};
use crate::restaurants::repository as restaurants;
use crate::reviews::domain::{ReviewInput, ReviewStatus};
use crate::reviews::rating::{overall_rating, recompute_restaurant};

/// A review with everything a listing shows next to it.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewView {
    #[serde(flatten)]
    pub review: Review,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub restaurant_name: String,
    pub response: Option<ReviewResponse>,
    pub images: Vec<Image>,
    pub helpful_by_viewer: bool,
}

pub fn find(conn: &Connection, id: &str) -> AppResult<Review> {
    conn.query_row(
        &format!("SELECT {} FROM reviews WHERE id = ?1", Review::COLUMNS),
        params![id],
        Review::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

pub fn find_by_author(conn: &Connection, user_id: &str, restaurant_id: &str) -> AppResult<Option<Review>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM reviews WHERE user_id = ?1 AND restaurant_id = ?2",
                Review::COLUMNS
            ),
            params![user_id, restaurant_id],
            Review::from_row,
        )
        .optional()?)
}

const ALREADY_REVIEWED: &str = "You have already reviewed this restaurant";

/// Submit a new review. It starts pending and the restaurant aggregate is
/// recomputed in the same transaction.
pub fn create(
    conn: &mut Connection,
    author: &User,
    restaurant_id: &str,
    input: ReviewInput,
    scope: AggregateScope,
) -> AppResult<Review> {
    let input = input.validated()?;
    let tx = crate::db::write_tx(conn)?;

    restaurants::find_visible(&tx, restaurant_id, false)?;
    if find_by_author(&tx, &author.id, restaurant_id)?.is_some() {
        return Err(AppError::field("restaurant_id", ALREADY_REVIEWED));
    }

    let id = new_id();
    tx.execute(
        "INSERT INTO reviews (id, user_id, restaurant_id, food_rating, service_rating,
             ambiance_rating, value_rating, overall_rating, title, content, visit_date,
             recommend, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            id,
            author.id,
            restaurant_id,
            input.food_rating,
            input.service_rating,
            input.ambiance_rating,
            input.value_rating,
            overall_rating(&input.ratings()),
            input.title,
            input.content,
            input.visit_date,
            input.recommend,
            ReviewStatus::Pending,
        ],
    )
    .map_err(AppError::unique("restaurant_id", ALREADY_REVIEWED))?;
    recompute_restaurant(&tx, restaurant_id, scope)?;
    tx.commit()?;

    tracing::info!(review_id = %id, restaurant_id, user_id = %author.id, "Created review");
    find(conn, &id)
}

/// Edit a review. Only the author may edit, and every edit sends the review
/// back to moderation.
pub fn update(
    conn: &mut Connection,
    actor: &User,
    review_id: &str,
    input: ReviewInput,
    scope: AggregateScope,
) -> AppResult<Review> {
    let input = input.validated()?;
    let tx = crate::db::write_tx(conn)?;

    let review = find(&tx, review_id)?;
    if review.user_id != actor.id {
        return Err(AppError::forbidden("You can only edit your own reviews"));
    }

    tx.execute(
        "UPDATE reviews SET food_rating = ?1, service_rating = ?2, ambiance_rating = ?3,
             value_rating = ?4, overall_rating = ?5, title = ?6, content = ?7,
             visit_date = ?8, recommend = ?9, status = ?10, approved_at = NULL,
             rejected_at = NULL, updated_at = datetime('now')
         WHERE id = ?11",
        params![
            input.food_rating,
            input.service_rating,
            input.ambiance_rating,
            input.value_rating,
            overall_rating(&input.ratings()),
            input.title,
            input.content,
            input.visit_date,
            input.recommend,
            ReviewStatus::Pending,
            review_id,
        ],
    )?;
    recompute_restaurant(&tx, &review.restaurant_id, scope)?;
    tx.commit()?;

    tracing::info!(review_id, previous_status = %review.status, "Updated review");
    find(conn, review_id)
}

/// Delete a review as its author or an admin. Returns the stored paths of
/// the review's images so the caller can remove the files.
pub fn delete(
    conn: &mut Connection,
    actor: &User,
    review_id: &str,
    scope: AggregateScope,
) -> AppResult<Vec<String>> {
    let tx = crate::db::write_tx(conn)?;

    let review = find(&tx, review_id)?;
    if review.user_id != actor.id && !actor.is_admin() {
        return Err(AppError::forbidden("You can only delete your own reviews"));
    }

    let paths = images::delete_all_for(&tx, &Imageable::Review(review.id.clone()))?;
    tx.execute("DELETE FROM reviews WHERE id = ?1", params![review_id])?;
    recompute_restaurant(&tx, &review.restaurant_id, scope)?;
    tx.commit()?;

    tracing::info!(review_id, actor_id = %actor.id, "Deleted review");
    Ok(paths)
}

/// Approved reviews of a restaurant, newest first.
pub fn list_for_restaurant(
    conn: &Connection,
    restaurant_id: &str,
    viewer_id: Option<&str>,
    page: Option<u32>,
    per_page: u32,
) -> AppResult<Page<ReviewView>> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM reviews WHERE restaurant_id = ?1 AND status = 'approved'",
        params![restaurant_id],
        |row| row.get(0),
    )?;

    let request = PageRequest::new(page, per_page);
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM reviews WHERE restaurant_id = ?1 AND status = 'approved'
         ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
        Review::COLUMNS
    ))?;
    let reviews = stmt
        .query_map(
            params![restaurant_id, request.limit(), request.offset()],
            Review::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(request.into_page(views(conn, reviews, viewer_id)?, total))
}

/// Reviews written by a user. Others only see the approved ones.
pub fn list_for_user(
    conn: &Connection,
    user_id: &str,
    approved_only: bool,
    viewer_id: Option<&str>,
) -> AppResult<Vec<ReviewView>> {
    let filter = if approved_only { "AND status = 'approved'" } else { "" };
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM reviews WHERE user_id = ?1 {} ORDER BY created_at DESC, id DESC",
        Review::COLUMNS,
        filter
    ))?;
    let reviews = stmt
        .query_map(params![user_id], Review::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    views(conn, reviews, viewer_id)
}

/// Attach author, restaurant, response, images and the viewer's vote.
pub fn views(conn: &Connection, reviews: Vec<Review>, viewer_id: Option<&str>) -> AppResult<Vec<ReviewView>> {
    reviews
        .into_iter()
        .map(|review| view(conn, review, viewer_id))
        .collect()
}

pub fn view(conn: &Connection, review: Review, viewer_id: Option<&str>) -> AppResult<ReviewView> {
    let (author_name, author_avatar, restaurant_name): (String, Option<String>, String) = conn.query_row(
        "SELECT u.name, u.avatar_path, r.name FROM users u, restaurants r
         WHERE u.id = ?1 AND r.id = ?2",
        params![review.user_id, review.restaurant_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let response = conn
        .query_row(
            &format!(
                "SELECT {} FROM review_responses WHERE review_id = ?1",
                ReviewResponse::COLUMNS
            ),
            params![review.id],
            ReviewResponse::from_row,
        )
        .optional()?;

    let helpful_by_viewer = match viewer_id {
        Some(viewer) => conn.query_row(
            "SELECT COUNT(*) > 0 FROM helpful_votes WHERE user_id = ?1 AND review_id = ?2",
            params![viewer, review.id],
            |row| row.get(0),
        )?,
        None => false,
    };

    let images = images::list(conn, &Imageable::Review(review.id.clone()))?;

    Ok(ReviewView {
        author_name,
        author_avatar: author_avatar.map(|p| format!("/uploads/{}", p)),
        restaurant_name,
        response,
        images,
        helpful_by_viewer,
        review,
    })
}
