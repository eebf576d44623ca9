//! Overall rating of a review and the per-restaurant aggregate cache.
//!
//! `restaurants.average_rating` and `restaurants.review_count` are caches of
//! `AVG(overall_rating)` and `COUNT(*)` over a restaurant's reviews. Every write
//! that changes the review set (or, with the approved-only scope, a review's
//! status) calls [`recompute_restaurant`] on the same connection.

use rusqlite::{params, Connection};

use crate::config::AggregateScope;
use crate::reviews::domain::SubRatings;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean of the four category ratings, to two decimals.
pub fn overall_rating(ratings: &SubRatings) -> f64 {
    let sum = ratings.food + ratings.service + ratings.ambiance + ratings.value;
    round2(sum as f64 / 4.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub average_rating: f64,
    pub review_count: i64,
}

/// Recompute and store the cached aggregate for one restaurant.
pub fn recompute_restaurant(
    conn: &Connection,
    restaurant_id: &str,
    scope: AggregateScope,
) -> rusqlite::Result<Aggregate> {
    let sql = match scope {
        AggregateScope::All => {
            "SELECT AVG(overall_rating), COUNT(*) FROM reviews WHERE restaurant_id = ?1"
        }
        AggregateScope::Approved => {
            "SELECT AVG(overall_rating), COUNT(*) FROM reviews
             WHERE restaurant_id = ?1 AND status = 'approved'"
        }
    };

    let (avg, count): (Option<f64>, i64) =
        conn.query_row(sql, params![restaurant_id], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;

    let aggregate = Aggregate {
        average_rating: round2(avg.unwrap_or(0.0)),
        review_count: count,
    };

    conn.execute(
        "UPDATE restaurants SET average_rating = ?1, review_count = ?2, updated_at = datetime('now')
         WHERE id = ?3",
        params![aggregate.average_rating, aggregate.review_count, restaurant_id],
    )?;

    tracing::debug!(
        restaurant_id,
        average = aggregate.average_rating,
        count = aggregate.review_count,
        "Recomputed restaurant rating"
    );

    Ok(aggregate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;

    fn insert_review(conn: &Connection, user: &str, restaurant: &str, overall: f64, status: &str) {
        conn.execute(
            "INSERT INTO reviews (id, user_id, restaurant_id, food_rating, service_rating,
                 ambiance_rating, value_rating, overall_rating, title, content, status)
             VALUES (?1, ?2, ?3, 3, 3, 3, 3, ?4, 't', 'content here', ?5)",
            params![crate::db::new_id(), user, restaurant, overall, status],
        )
        .unwrap();
    }

    #[test]
    fn overall_is_mean_of_four() {
        let ratings = SubRatings {
            food: 5,
            service: 4,
            ambiance: 5,
            value: 3,
        };
        assert_eq!(overall_rating(&ratings), 4.25);

        let ratings = SubRatings {
            food: 1,
            service: 1,
            ambiance: 1,
            value: 2,
        };
        assert_eq!(overall_rating(&ratings), 1.25);
    }

    #[test]
    fn round2_rounds_half_away_from_zero() {
        assert_eq!(round2(3.3333), 3.33);
        assert_eq!(round2(3.6666), 3.67);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn empty_restaurant_averages_zero() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let r = testing::insert_restaurant(&conn, "Empty");

        let agg = recompute_restaurant(&conn, &r, AggregateScope::All).unwrap();
        assert_eq!(agg.average_rating, 0.0);
        assert_eq!(agg.review_count, 0);
    }

    #[test]
    fn all_scope_counts_every_status() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let r = testing::insert_restaurant(&conn, "Trattoria");
        let a = testing::insert_user(&conn, "Ana", "user");
        let b = testing::insert_user(&conn, "Bea", "user");
        let c = testing::insert_user(&conn, "Caio", "user");
        insert_review(&conn, &a, &r, 4.25, "approved");
        insert_review(&conn, &b, &r, 2.0, "pending");
        insert_review(&conn, &c, &r, 3.0, "rejected");

        let agg = recompute_restaurant(&conn, &r, AggregateScope::All).unwrap();
        assert_eq!(agg.review_count, 3);
        assert_eq!(agg.average_rating, 3.08);

        let stored: (f64, i64) = conn
            .query_row(
                "SELECT average_rating, review_count FROM restaurants WHERE id = ?1",
                params![r],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(stored, (3.08, 3));
    }

    #[test]
    fn approved_scope_ignores_undecided_reviews() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let r = testing::insert_restaurant(&conn, "Bistro");
        let a = testing::insert_user(&conn, "Ana", "user");
        let b = testing::insert_user(&conn, "Bea", "user");
        insert_review(&conn, &a, &r, 4.5, "approved");
        insert_review(&conn, &b, &r, 1.0, "pending");

        let agg = recompute_restaurant(&conn, &r, AggregateScope::Approved).unwrap();
        assert_eq!(agg.review_count, 1);
        assert_eq!(agg.average_rating, 4.5);
    }
}
