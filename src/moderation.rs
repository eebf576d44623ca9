//! Admin actions on reviews and accounts, and the dashboard numbers.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};

use crate::auth::session;
use crate::config::AggregateScope;
use crate::db::models::{Review, User};
use crate::error::{AppError, AppResult};
use crate::images::domain::Imageable;
use crate::images::repository as images;
use crate::pagination::{Page, PageRequest};
use crate::restaurants::repository::{self as restaurants, RestaurantCard};
use crate::reviews::domain::{Moderation, ReviewStatus};
use crate::reviews::rating::recompute_restaurant;
use crate::reviews::repository::{self as reviews, ReviewView};
use crate::users::domain::Role;
use crate::users::repository as users;

/// Approve or reject a pending review, stamping the decision time.
pub fn moderate(
    conn: &mut Connection,
    review_id: &str,
    action: Moderation,
    scope: AggregateScope,
) -> AppResult<Review> {
    let tx = crate::db::write_tx(conn)?;
    let review = reviews::find(&tx, review_id)?;
    let next = review.status.apply(action)?;

    let stamp = match next {
        ReviewStatus::Approved => "approved_at",
        _ => "rejected_at",
    };
    tx.execute(
        &format!(
            "UPDATE reviews SET status = ?1, {} = datetime('now'), updated_at = datetime('now')
             WHERE id = ?2",
            stamp
        ),
        params![next, review_id],
    )?;
    recompute_restaurant(&tx, &review.restaurant_id, scope)?;
    tx.commit()?;

    tracing::info!(review_id, status = %next, "Moderated review");
    reviews::find(conn, review_id)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ReviewFilters {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
}

/// Moderation queue; pending first, then newest.
pub fn admin_reviews(conn: &Connection, filters: ReviewFilters, per_page: u32) -> AppResult<Page<ReviewView>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    if let Some(status) = filters.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let status: ReviewStatus = status
            .parse()
            .map_err(|_| AppError::field("status", "Unknown review status"))?;
        clauses.push("status = ?".into());
        values.push(SqlValue::Text(status.as_str().into()));
    }
    if let Some(search) = filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push("(title LIKE ? OR content LIKE ?)".into());
        let pattern = format!("%{}%", search);
        values.push(SqlValue::Text(pattern.clone()));
        values.push(SqlValue::Text(pattern));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM reviews {}", where_sql),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;
    let request = PageRequest::new(filters.page, per_page);
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM reviews {} ORDER BY status = 'pending' DESC, created_at DESC, id DESC
         LIMIT {} OFFSET {}",
        Review::COLUMNS,
        where_sql,
        request.limit(),
        request.offset()
    ))?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), Review::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(request.into_page(reviews::views(conn, rows, None)?, total))
}

/// Admins may not act on themselves, and only a super admin acts on other admins.
fn check_target(actor: &User, target: &User) -> AppResult<()> {
    if actor.id == target.id {
        return Err(AppError::forbidden("You cannot do this to your own account"));
    }
    if target.is_admin() && actor.role != Role::SuperAdmin {
        return Err(AppError::forbidden(
            "Only a super admin can manage administrators",
        ));
    }
    Ok(())
}

pub fn ban(conn: &Connection, actor: &User, user_id: &str) -> AppResult<User> {
    let target = users::find(conn, user_id)?;
    check_target(actor, &target)?;

    conn.execute(
        "UPDATE users SET is_active = 0, banned_at = datetime('now'), updated_at = datetime('now')
         WHERE id = ?1",
        params![user_id],
    )?;
    let revoked = session::revoke_user_sessions(conn, user_id)?;

    tracing::info!(user_id, actor_id = %actor.id, revoked, "Banned user");
    users::find(conn, user_id)
}

pub fn unban(conn: &Connection, actor: &User, user_id: &str) -> AppResult<User> {
    let target = users::find(conn, user_id)?;
    check_target(actor, &target)?;

    conn.execute(
        "UPDATE users SET is_active = 1, banned_at = NULL, updated_at = datetime('now') WHERE id = ?1",
        params![user_id],
    )?;
    tracing::info!(user_id, actor_id = %actor.id, "Unbanned user");
    users::find(conn, user_id)
}

/// Delete an account and everything hanging off it. Aggregates and helpful
/// counts touched by the removed rows are recomputed in the same transaction.
/// Returns stored file paths (avatar and review images) for the caller to remove.
pub fn delete_user(
    conn: &mut Connection,
    actor: &User,
    user_id: &str,
    scope: AggregateScope,
) -> AppResult<Vec<String>> {
    let tx = crate::db::write_tx(conn)?;
    let target = users::find(&tx, user_id)?;
    check_target(actor, &target)?;

    let collect = |sql: &str| -> rusqlite::Result<Vec<String>> {
        let mut stmt = tx.prepare(sql)?;
        let rows = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>();
        rows
    };
    let restaurant_ids = collect("SELECT DISTINCT restaurant_id FROM reviews WHERE user_id = ?1")?;
    let review_ids = collect("SELECT id FROM reviews WHERE user_id = ?1")?;
    let voted_reviews = collect(
        "SELECT v.review_id FROM helpful_votes v JOIN reviews r ON r.id = v.review_id
         WHERE v.user_id = ?1 AND r.user_id != ?1",
    )?;

    let mut paths: Vec<String> = target.avatar_path.iter().cloned().collect();
    for review_id in review_ids {
        paths.extend(images::delete_all_for(&tx, &Imageable::Review(review_id))?);
    }

    tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;

    for restaurant_id in &restaurant_ids {
        recompute_restaurant(&tx, restaurant_id, scope)?;
    }
    for review_id in &voted_reviews {
        tx.execute(
            "UPDATE reviews SET helpful_count =
                 (SELECT COUNT(*) FROM helpful_votes WHERE review_id = ?1)
             WHERE id = ?1",
            params![review_id],
        )?;
    }
    tx.commit()?;

    tracing::info!(
        user_id,
        actor_id = %actor.id,
        restaurants = restaurant_ids.len(),
        "Deleted user"
    );
    Ok(paths)
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct UserStats {
    pub total: i64,
    pub active: i64,
    pub banned: i64,
    pub owners: i64,
    pub admins: i64,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct RestaurantStats {
    pub total: i64,
    pub active: i64,
    pub claimed: i64,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct ReviewStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub average_rating: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub users: UserStats,
    pub restaurants: RestaurantStats,
    pub reviews: ReviewStats,
    pub recent_reviews: Vec<ReviewView>,
    pub top_restaurants: Vec<RestaurantCard>,
}

pub fn dashboard_stats(conn: &Connection) -> AppResult<DashboardStats> {
    let users = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(is_active = 1), 0),
                COALESCE(SUM(is_active = 0), 0),
                COALESCE(SUM(role = 'restaurant_owner' OR restaurant_id IS NOT NULL), 0),
                COALESCE(SUM(is_admin = 1 OR role IN ('admin', 'super_admin')), 0)
         FROM users",
        [],
        |row| {
            Ok(UserStats {
                total: row.get(0)?,
                active: row.get(1)?,
                banned: row.get(2)?,
                owners: row.get(3)?,
                admins: row.get(4)?,
            })
        },
    )?;

    let restaurants_stats = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(is_active = 1), 0), COALESCE(SUM(owner_id IS NOT NULL), 0)
         FROM restaurants",
        [],
        |row| {
            Ok(RestaurantStats {
                total: row.get(0)?,
                active: row.get(1)?,
                claimed: row.get(2)?,
            })
        },
    )?;

    let reviews_stats = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'pending'), 0),
                COALESCE(SUM(status = 'approved'), 0),
                COALESCE(SUM(status = 'rejected'), 0),
                COALESCE(AVG(overall_rating), 0)
         FROM reviews",
        [],
        |row| {
            Ok(ReviewStats {
                total: row.get(0)?,
                pending: row.get(1)?,
                approved: row.get(2)?,
                rejected: row.get(3)?,
                average_rating: crate::reviews::rating::round2(row.get(4)?),
            })
        },
    )?;

    let recent: Vec<Review> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reviews ORDER BY created_at DESC, id DESC LIMIT 5",
            Review::COLUMNS
        ))?;
        let rows = stmt
            .query_map([], Review::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    Ok(DashboardStats {
        users,
        restaurants: restaurants_stats,
        reviews: reviews_stats,
        recent_reviews: reviews::views(conn, recent, None)?,
        top_restaurants: restaurants::top_rated(conn, 5)?,
    })
}
