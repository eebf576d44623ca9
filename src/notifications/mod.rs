//! Notifications for review activity.
//!
//! Delivery happens off the request path: handlers call [`Notifier::dispatch`]
//! and move on. Every notification goes to the database channel; the mail
//! channel is added per recipient when they opted in and mail is configured.

pub mod channels;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::config::MailConfig;
use crate::db::models::{Notification, User};
use crate::error::{AppError, AppResult};
use crate::state::DbPool;
use crate::users::repository as users;

use self::channels::{Channel, DatabaseChannel, MailChannel};

/// Something happened that someone should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NewReview { review_id: String },
    OwnerResponse { review_id: String },
}

/// Notification payload, stored as the `data` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    NewReview {
        review_id: String,
        restaurant_id: String,
        restaurant_name: String,
        reviewer_name: String,
        overall_rating: f64,
    },
    OwnerResponse {
        review_id: String,
        restaurant_id: String,
        restaurant_name: String,
        responder_name: String,
    },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::NewReview { .. } => "new_review",
            Message::OwnerResponse { .. } => "owner_response",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Message::NewReview { restaurant_name, .. } => {
                format!("New review for {}", restaurant_name)
            }
            Message::OwnerResponse { restaurant_name, .. } => {
                format!("{} responded to your review", restaurant_name)
            }
        }
    }

    pub fn body(&self, recipient_name: &str) -> String {
        match self {
            Message::NewReview {
                restaurant_id,
                restaurant_name,
                reviewer_name,
                overall_rating,
                ..
            } => format!(
                "Hi {},\n\n{} rated {} {:.2} out of 5. The review is waiting for moderation.\n\n/restaurants/{}\n",
                recipient_name, reviewer_name, restaurant_name, overall_rating, restaurant_id
            ),
            Message::OwnerResponse {
                restaurant_id,
                restaurant_name,
                responder_name,
                ..
            } => format!(
                "Hi {},\n\n{} of {} replied to your review.\n\n/restaurants/{}\n",
                recipient_name, responder_name, restaurant_name, restaurant_id
            ),
        }
    }
}

/// Work out who hears about an event and what they are told. `None` when
/// nobody should be notified, such as a review of an unclaimed restaurant.
fn resolve(conn: &Connection, event: &Event) -> AppResult<Option<(User, Message)>> {
    match event {
        Event::NewReview { review_id } => {
            let row: Option<(Option<String>, String, String, String, f64, String)> = conn
                .query_row(
                    "SELECT r.owner_id, r.id, r.name, u.name, rv.overall_rating, rv.user_id
                     FROM reviews rv
                     JOIN restaurants r ON r.id = rv.restaurant_id
                     JOIN users u ON u.id = rv.user_id
                     WHERE rv.id = ?1",
                    params![review_id],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    },
                )
                .optional()?;
            let Some((Some(owner_id), restaurant_id, restaurant_name, reviewer_name, overall_rating, author_id)) = row
            else {
                return Ok(None);
            };
            if owner_id == author_id {
                return Ok(None);
            }
            let owner = users::find(conn, &owner_id)?;
            Ok(Some((
                owner,
                Message::NewReview {
                    review_id: review_id.clone(),
                    restaurant_id,
                    restaurant_name,
                    reviewer_name,
                    overall_rating,
                },
            )))
        }
        Event::OwnerResponse { review_id } => {
            let row: Option<(String, String, String, String)> = conn
                .query_row(
                    "SELECT rv.user_id, r.id, r.name, u.name
                     FROM review_responses rr
                     JOIN reviews rv ON rv.id = rr.review_id
                     JOIN restaurants r ON r.id = rv.restaurant_id
                     JOIN users u ON u.id = rr.user_id
                     WHERE rr.review_id = ?1",
                    params![review_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;
            let Some((author_id, restaurant_id, restaurant_name, responder_name)) = row else {
                return Ok(None);
            };
            let author = users::find(conn, &author_id)?;
            Ok(Some((
                author,
                Message::OwnerResponse {
                    review_id: review_id.clone(),
                    restaurant_id,
                    restaurant_name,
                    responder_name,
                },
            )))
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    pool: DbPool,
    mail: MailConfig,
}

impl Notifier {
    pub fn new(pool: DbPool, mail: MailConfig) -> Self {
        Self { pool, mail }
    }

    /// Channels for one recipient. Mail problems drop the channel, never the notification.
    pub fn channels(&self, recipient: &User) -> Vec<Box<dyn Channel>> {
        let mut channels: Vec<Box<dyn Channel>> =
            vec![Box::new(DatabaseChannel::new(self.pool.clone()))];

        if recipient.email_notifications {
            match self.mail.sender() {
                Ok(from) => channels.push(Box::new(MailChannel::new(
                    self.pool.clone(),
                    from,
                    self.mail.from_name.as_deref(),
                ))),
                Err(reason) if self.mail.enabled => {
                    tracing::warn!(user_id = %recipient.id, "Skipping mail channel: {}", reason);
                }
                Err(_) => {}
            }
        }
        channels
    }

    /// Deliver an event now, returning the channels that accepted it.
    pub async fn deliver(&self, event: &Event) -> AppResult<Vec<&'static str>> {
        let resolved = {
            let conn = self.pool.get()?;
            resolve(&conn, event)?
        };
        let Some((recipient, message)) = resolved else {
            tracing::debug!(?event, "No recipient for notification");
            return Ok(Vec::new());
        };

        let mut delivered = Vec::new();
        for channel in self.channels(&recipient) {
            match channel.deliver(&recipient, &message).await {
                Ok(()) => delivered.push(channel.name()),
                Err(e) => tracing::warn!(
                    channel = channel.name(),
                    user_id = %recipient.id,
                    "Notification delivery failed: {}",
                    e
                ),
            }
        }
        tracing::info!(kind = message.kind(), user_id = %recipient.id, ?delivered, "Notification sent");
        Ok(delivered)
    }

    /// Fire and forget.
    pub fn dispatch(&self, event: Event) {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.deliver(&event).await {
                tracing::warn!(?event, "Notification dispatch failed: {}", e);
            }
        });
    }
}

pub fn list(conn: &Connection, user_id: &str, unread_only: bool) -> AppResult<Vec<Notification>> {
    let filter = if unread_only { "AND read_at IS NULL" } else { "" };
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM notifications WHERE user_id = ?1 {} ORDER BY created_at DESC, id DESC LIMIT 50",
        Notification::COLUMNS,
        filter
    ))?;
    let rows = stmt
        .query_map(params![user_id], Notification::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn unread_count(conn: &Connection, user_id: &str) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read_at IS NULL",
        params![user_id],
        |row| row.get(0),
    )?)
}

pub fn mark_read(conn: &Connection, user_id: &str, id: &str) -> AppResult<()> {
    let changed = conn.execute(
        "UPDATE notifications SET read_at = COALESCE(read_at, datetime('now'))
         WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub fn mark_all_read(conn: &Connection, user_id: &str) -> AppResult<usize> {
    Ok(conn.execute(
        "UPDATE notifications SET read_at = datetime('now') WHERE user_id = ?1 AND read_at IS NULL",
        params![user_id],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;

    struct Scene {
        _dir: tempfile::TempDir,
        pool: DbPool,
        owner: String,
        author: String,
        review: String,
    }

    fn scene() -> Scene {
        let tmp = tempfile::tempdir().unwrap();
        let pool = crate::db::create_pool(&tmp.path().join("n.db")).unwrap();
        crate::db::run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        let r = testing::insert_restaurant(&conn, "Tasca");
        let owner = testing::insert_user(&conn, "Olga", "restaurant_owner");
        let author = testing::insert_user(&conn, "Rita", "user");
        conn.execute("UPDATE restaurants SET owner_id = ?1 WHERE id = ?2", params![owner, r])
            .unwrap();
        let review = crate::db::new_id();
        conn.execute(
            "INSERT INTO reviews (id, user_id, restaurant_id, food_rating, service_rating,
                 ambiance_rating, value_rating, overall_rating, title, content)
             VALUES (?1, ?2, ?3, 5, 4, 5, 3, 4.25, 't', 'content here')",
            params![review, author, r],
        )
        .unwrap();
        drop(conn);
        Scene {
            _dir: tmp,
            pool,
            owner,
            author,
            review,
        }
    }

    fn mail(enabled: bool, from: Option<&str>) -> MailConfig {
        MailConfig {
            enabled,
            from_address: from.map(str::to_string),
            from_name: Some("Forkful".into()),
        }
    }

    fn outbox(pool: &DbPool) -> i64 {
        pool.get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM mail_outbox", [], |row| row.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn new_review_reaches_owner_by_database_and_mail() {
        let s = scene();
        let notifier = Notifier::new(s.pool.clone(), mail(true, Some("noreply@forkful.local")));

        let delivered = notifier
            .deliver(&Event::NewReview { review_id: s.review.clone() })
            .await
            .unwrap();
        assert_eq!(delivered, vec!["database", "mail"]);

        let conn = s.pool.get().unwrap();
        let stored = list(&conn, &s.owner, true).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind, "new_review");
        assert_eq!(stored[0].data["reviewer_name"], "Rita");
        drop(conn);
        assert_eq!(outbox(&s.pool), 1);
    }

    #[tokio::test]
    async fn misconfigured_mail_falls_back_to_database() {
        let s = scene();
        let notifier = Notifier::new(s.pool.clone(), mail(true, None));

        let delivered = notifier
            .deliver(&Event::NewReview { review_id: s.review.clone() })
            .await
            .unwrap();
        assert_eq!(delivered, vec!["database"]);
        assert_eq!(outbox(&s.pool), 0);
    }

    #[tokio::test]
    async fn opted_out_users_get_no_mail() {
        let s = scene();
        s.pool
            .get()
            .unwrap()
            .execute("UPDATE users SET email_notifications = 0 WHERE id = ?1", params![s.owner])
            .unwrap();
        let notifier = Notifier::new(s.pool.clone(), mail(true, Some("noreply@forkful.local")));

        let delivered = notifier
            .deliver(&Event::NewReview { review_id: s.review.clone() })
            .await
            .unwrap();
        assert_eq!(delivered, vec!["database"]);
    }

    #[tokio::test]
    async fn owner_response_notifies_author_and_marks_read() {
        let s = scene();
        s.pool
            .get()
            .unwrap()
            .execute(
                "INSERT INTO review_responses (id, review_id, user_id, response) VALUES ('rr', ?1, ?2, 'Thanks')",
                params![s.review, s.owner],
            )
            .unwrap();
        let notifier = Notifier::new(s.pool.clone(), mail(false, None));

        notifier
            .deliver(&Event::OwnerResponse { review_id: s.review.clone() })
            .await
            .unwrap();

        let conn = s.pool.get().unwrap();
        assert_eq!(unread_count(&conn, &s.author).unwrap(), 1);
        let n = &list(&conn, &s.author, false).unwrap()[0];
        assert_eq!(n.kind, "owner_response");
        assert!(matches!(mark_read(&conn, &s.owner, &n.id), Err(AppError::NotFound)));
        mark_read(&conn, &s.author, &n.id).unwrap();
        assert_eq!(unread_count(&conn, &s.author).unwrap(), 0);
    }

    #[tokio::test]
    async fn unclaimed_restaurants_notify_nobody() {
        let s = scene();
        s.pool
            .get()
            .unwrap()
            .execute("UPDATE restaurants SET owner_id = NULL", [])
            .unwrap();
        let notifier = Notifier::new(s.pool.clone(), mail(false, None));

        let delivered = notifier
            .deliver(&Event::NewReview { review_id: s.review.clone() })
            .await
            .unwrap();
        assert!(delivered.is_empty());
    }

    #[test]
    fn message_text_mentions_restaurant() {
        let message = Message::OwnerResponse {
            review_id: "rv".into(),
            restaurant_id: "r1".into(),
            restaurant_name: "Tasca".into(),
            responder_name: "Olga".into(),
        };
        assert_eq!(message.subject(), "Tasca responded to your review");
        assert!(message.body("Rita").starts_with("Hi Rita"));
        assert_eq!(
            serde_json::to_value(&message).unwrap()["type"],
            "owner_response"
        );
    }
}
