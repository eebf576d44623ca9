use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::reviews::domain::ReviewStatus;
use crate::reviews::repository::find;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HelpfulState {
    pub helpful: bool,
    pub helpful_count: i64,
}

/// Flip the user's helpful vote on a review and recount. The vote change and
/// the counter update commit together, so the returned count includes it.
pub fn toggle(conn: &mut Connection, user_id: &str, review_id: &str) -> AppResult<HelpfulState> {
    let tx = crate::db::write_tx(conn)?;

    let review = find(&tx, review_id)?;
    if review.status != ReviewStatus::Approved {
        return Err(AppError::NotFound);
    }
    if review.user_id == user_id {
        return Err(AppError::forbidden("You cannot vote on your own review"));
    }

    let removed = tx.execute(
        "DELETE FROM helpful_votes WHERE user_id = ?1 AND review_id = ?2",
        params![user_id, review_id],
    )?;
    if removed == 0 {
        tx.execute(
            "INSERT INTO helpful_votes (user_id, review_id) VALUES (?1, ?2)",
            params![user_id, review_id],
        )?;
    }

    let helpful_count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM helpful_votes WHERE review_id = ?1",
        params![review_id],
        |row| row.get(0),
    )?;
    tx.execute(
        "UPDATE reviews SET helpful_count = ?1 WHERE id = ?2",
        params![helpful_count, review_id],
    )?;
    tx.commit()?;

    Ok(HelpfulState {
        helpful: removed == 0,
        helpful_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;

    fn approved_review(conn: &Connection, author: &str, restaurant: &str) -> String {
        let id = crate::db::new_id();
        conn.execute(
            "INSERT INTO reviews (id, user_id, restaurant_id, food_rating, service_rating,
                 ambiance_rating, value_rating, overall_rating, title, content, status)
             VALUES (?1, ?2, ?3, 4, 4, 4, 4, 4.0, 't', 'content here', 'approved')",
            params![id, author, restaurant],
        )
        .unwrap();
        id
    }

    #[test]
    fn toggling_twice_restores_the_count() {
        let pool = testing::pool();
        let mut conn = pool.get().unwrap();
        let r = testing::insert_restaurant(&conn, "Tasca");
        let author = testing::insert_user(&conn, "Rita", "user");
        let voter = testing::insert_user(&conn, "Vera", "user");
        let other = testing::insert_user(&conn, "Otto", "user");
        let review = approved_review(&conn, &author, &r);

        let first = toggle(&mut conn, &voter, &review).unwrap();
        assert_eq!(first, HelpfulState { helpful: true, helpful_count: 1 });

        let second = toggle(&mut conn, &other, &review).unwrap();
        assert_eq!(second.helpful_count, 2);

        let undo = toggle(&mut conn, &voter, &review).unwrap();
        assert_eq!(undo, HelpfulState { helpful: false, helpful_count: 1 });

        let stored: i64 = conn
            .query_row("SELECT helpful_count FROM reviews WHERE id = ?1", params![review], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[test]
    fn authors_cannot_vote_for_themselves() {
        let pool = testing::pool();
        let mut conn = pool.get().unwrap();
        let r = testing::insert_restaurant(&conn, "Tasca");
        let author = testing::insert_user(&conn, "Rita", "user");
        let review = approved_review(&conn, &author, &r);

        assert!(matches!(toggle(&mut conn, &author, &review), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn pending_reviews_cannot_be_voted() {
        let pool = testing::pool();
        let mut conn = pool.get().unwrap();
        let r = testing::insert_restaurant(&conn, "Tasca");
        let author = testing::insert_user(&conn, "Rita", "user");
        let voter = testing::insert_user(&conn, "Vera", "user");
        let review = approved_review(&conn, &author, &r);
        conn.execute("UPDATE reviews SET status = 'pending' WHERE id = ?1", params![review])
            .unwrap();

        assert!(matches!(toggle(&mut conn, &voter, &review), Err(AppError::NotFound)));
    }

    #[test]
    fn concurrent_voters_on_a_file_database_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::create_pool(&dir.path().join("forkful.db")).unwrap();
        crate::db::run_migrations(&pool).unwrap();

        let (review, voters) = {
            let conn = pool.get().unwrap();
            let r = testing::insert_restaurant(&conn, "Tasca");
            let author = testing::insert_user(&conn, "Rita", "user");
            let voters: Vec<String> = (0..8)
                .map(|i| testing::insert_user(&conn, &format!("Voter{}", i), "user"))
                .collect();
            (approved_review(&conn, &author, &r), voters)
        };

        std::thread::scope(|scope| {
            for voter in &voters {
                let pool = pool.clone();
                let review = review.clone();
                scope.spawn(move || {
                    for _ in 0..20 {
                        let mut conn = pool.get().unwrap();
                        toggle(&mut conn, voter, &review).unwrap();
                    }
                });
            }
        });

        // An even number of toggles per voter leaves no votes behind.
        let conn = pool.get().unwrap();
        let stored: i64 = conn
            .query_row("SELECT helpful_count FROM reviews WHERE id = ?1", params![review], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, 0);
    }
}
