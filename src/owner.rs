use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::models::{Restaurant, Review, User};
use crate::error::{AppError, AppResult};
use crate::restaurants::repository::{self as restaurants, RestaurantCard, RestaurantInput};
use crate::reviews::repository::{self as reviews, ReviewView};
use crate::users::domain::Role;
use crate::users::repository as users;

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct StatusBreakdown {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub responded: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnerDashboard {
    pub restaurant: Restaurant,
    pub breakdown: StatusBreakdown,
    /// Count of reviews per rounded overall rating, index 0 is one star.
    pub rating_histogram: [i64; 5],
    pub favorites: i64,
    pub recent_reviews: Vec<ReviewView>,
}

/// The owner's restaurant, or `None` when they have not claimed one yet.
pub fn dashboard(conn: &Connection, owner: &User) -> AppResult<Option<OwnerDashboard>> {
    let Some(restaurant_id) = owner.restaurant_id.as_deref() else {
        return Ok(None);
    };
    let restaurant = restaurants::find(conn, restaurant_id)?;

    let breakdown = conn.query_row(
        "SELECT COALESCE(SUM(r.status = 'pending'), 0),
                COALESCE(SUM(r.status = 'approved'), 0),
                COALESCE(SUM(r.status = 'rejected'), 0),
                COUNT(rr.id)
         FROM reviews r LEFT JOIN review_responses rr ON rr.review_id = r.id
         WHERE r.restaurant_id = ?1",
        params![restaurant_id],
        |row| {
            Ok(StatusBreakdown {
                pending: row.get(0)?,
                approved: row.get(1)?,
                rejected: row.get(2)?,
                responded: row.get(3)?,
            })
        },
    )?;

    let mut rating_histogram = [0i64; 5];
    {
        let mut stmt = conn.prepare(
            "SELECT CAST(ROUND(overall_rating) AS INTEGER), COUNT(*) FROM reviews
             WHERE restaurant_id = ?1 GROUP BY 1",
        )?;
        let rows = stmt.query_map(params![restaurant_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (stars, count) = row?;
            if (1..=5).contains(&stars) {
                rating_histogram[(stars - 1) as usize] = count;
            }
        }
    }

    let favorites: i64 = conn.query_row(
        "SELECT COUNT(*) FROM favorites WHERE restaurant_id = ?1",
        params![restaurant_id],
        |row| row.get(0),
    )?;

    let recent: Vec<Review> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reviews WHERE restaurant_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT 10",
            Review::COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![restaurant_id], Review::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    Ok(Some(OwnerDashboard {
        restaurant,
        breakdown,
        rating_histogram,
        favorites,
        recent_reviews: reviews::views(conn, recent, Some(&owner.id))?,
    }))
}

/// Active restaurants nobody has claimed yet.
pub fn claimable(conn: &Connection) -> AppResult<Vec<RestaurantCard>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, NULL FROM restaurants WHERE is_active = 1 AND owner_id IS NULL
         ORDER BY name COLLATE NOCASE",
        Restaurant::COLUMNS
    ))?;
    let cards = stmt
        .query_map([], |row| {
            Ok(RestaurantCard {
                restaurant: Restaurant::from_row(row)?,
                primary_image: None,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cards)
}

/// Link a user and an unowned restaurant. Both sides are written in one
/// transaction; plain users become restaurant owners.
pub fn claim(conn: &mut Connection, user_id: &str, restaurant_id: &str) -> AppResult<User> {
    let tx = crate::db::write_tx(conn)?;
    let user = users::find(&tx, user_id)?;
    let restaurant = restaurants::find_visible(&tx, restaurant_id, false)?;

    if user.restaurant_id.is_some() {
        return Err(AppError::field(
            "restaurant_id",
            "You already manage a restaurant",
        ));
    }
    if restaurant.owner_id.is_some() {
        return Err(AppError::field(
            "restaurant_id",
            "This restaurant has already been claimed",
        ));
    }

    let role = if user.role == Role::User {
        Role::RestaurantOwner
    } else {
        user.role
    };
    tx.execute(
        "UPDATE restaurants SET owner_id = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![user_id, restaurant_id],
    )?;
    tx.execute(
        "UPDATE users SET restaurant_id = ?1, role = ?2, updated_at = datetime('now') WHERE id = ?3",
        params![restaurant_id, role, user_id],
    )?;
    tx.commit()?;

    tracing::info!(user_id, restaurant_id, "Restaurant claimed");
    users::find(conn, user_id)
}

/// Owners edit everything about their listing except its name.
pub fn update_restaurant(conn: &Connection, owner: &User, mut input: RestaurantInput) -> AppResult<Restaurant> {
    let restaurant_id = owner
        .restaurant_id
        .as_deref()
        .ok_or_else(|| AppError::forbidden("You have not claimed a restaurant"))?;
    let current = restaurants::find(conn, restaurant_id)?;
    input.name = current.name;
    restaurants::update(conn, restaurant_id, input)
}
