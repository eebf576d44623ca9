// Delivery channels - each one isolates a single side effect
use async_trait::async_trait;
use rusqlite::params;

use crate::db::models::User;
use crate::db::new_id;
use crate::error::AppResult;
use crate::notifications::Message;
use crate::state::DbPool;

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, recipient: &User, message: &Message) -> AppResult<()>;
}

/// Stores the notification for the in-app list.
pub struct DatabaseChannel {
    pool: DbPool,
}

impl DatabaseChannel {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Channel for DatabaseChannel {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn deliver(&self, recipient: &User, message: &Message) -> AppResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO notifications (id, user_id, kind, data) VALUES (?1, ?2, ?3, ?4)",
            params![
                new_id(),
                recipient.id,
                message.kind(),
                serde_json::to_string(message)?
            ],
        )?;
        Ok(())
    }
}

/// Queues an email in the outbox table; a relay outside this process sends it.
pub struct MailChannel {
    pool: DbPool,
    from: String,
}

impl MailChannel {
    pub fn new(pool: DbPool, from_address: &str, from_name: Option<&str>) -> Self {
        let from = match from_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => format!("{} <{}>", name, from_address),
            None => from_address.to_string(),
        };
        Self { pool, from }
    }
}

#[async_trait]
impl Channel for MailChannel {
    fn name(&self) -> &'static str {
        "mail"
    }

    async fn deliver(&self, recipient: &User, message: &Message) -> AppResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO mail_outbox (id, to_address, from_address, subject, body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new_id(),
                recipient.email,
                self.from,
                message.subject(),
                message.body(&recipient.name)
            ],
        )?;
        Ok(())
    }
}
