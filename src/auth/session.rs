use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

/// Create a new session for a user. Returns the session token.
pub fn create_session(conn: &Connection, user_id: &str, hours: u64) -> rusqlite::Result<String> {
    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, user_id, token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// User id owning a live session token.
pub fn session_user(conn: &Connection, token: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT user_id FROM sessions WHERE token = ?1 AND expires_at > datetime('now')",
        params![token],
        |row| row.get(0),
    )
    .optional()
}

/// Delete a session by token.
pub fn delete_session(conn: &Connection, token: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Sign a user out everywhere.
pub fn revoke_user_sessions(conn: &Connection, user_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])
}

pub fn purge_expired(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM sessions WHERE expires_at <= datetime('now')",
        [],
    )
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

pub fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

pub fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
    }

    #[test]
    fn session_lifecycle() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let user = testing::insert_user(&conn, "Sam", "user");

        let token = create_session(&conn, &user, 1).unwrap();
        assert_eq!(session_user(&conn, &token).unwrap(), Some(user.clone()));

        delete_session(&conn, &token).unwrap();
        assert_eq!(session_user(&conn, &token).unwrap(), None);
    }

    #[test]
    fn expired_sessions_are_ignored_and_purged() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let user = testing::insert_user(&conn, "Sam", "user");
        conn.execute(
            "INSERT INTO sessions (id, user_id, token, expires_at)
             VALUES ('s1', ?1, 'old', datetime('now', '-1 hours'))",
            params![user],
        )
        .unwrap();

        assert_eq!(session_user(&conn, "old").unwrap(), None);
        assert_eq!(purge_expired(&conn).unwrap(), 1);
    }

    #[test]
    fn revoke_removes_every_session() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let user = testing::insert_user(&conn, "Sam", "user");
        create_session(&conn, &user, 1).unwrap();
        create_session(&conn, &user, 1).unwrap();

        assert_eq!(revoke_user_sessions(&conn, &user).unwrap(), 2);
    }

    #[test]
    fn cookies_carry_name_and_age() {
        assert_eq!(
            session_cookie("fk", "abc", 2),
            "fk=abc; HttpOnly; SameSite=Lax; Path=/; Max-Age=7200"
        );
        assert!(clear_session_cookie("fk").contains("Max-Age=0"));
    }
}
