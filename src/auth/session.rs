use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::new_id;
use crate::error::AppResult;
use crate::extractors::CurrentUser;

/// A freshly issued bearer token.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: String,
}

/// Create a new session for a user, valid for `hours`.
pub fn create_session(conn: &Connection, user_id: &str, hours: u64) -> AppResult<IssuedSession> {
    let token = generate_token();
    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at)
         VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![new_id(), user_id, token, format!("+{} hours", hours)],
    )?;
    let expires_at = conn.query_row(
        "SELECT expires_at FROM sessions WHERE token = ?1",
        params![token],
        |row| row.get(0),
    )?;
    Ok(IssuedSession { token, expires_at })
}

/// Resolve a bearer token to its user. Expired or unknown tokens yield `None`.
pub fn resolve(conn: &Connection, token: &str) -> AppResult<Option<CurrentUser>> {
    Ok(conn
        .query_row(
            "SELECT u.id, u.username FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token = ?1 AND s.expires_at > datetime('now')",
            params![token],
            |row| {
                Ok(CurrentUser {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    token: token.to_string(),
                })
            },
        )
        .optional()?)
}

/// Revoke a session by token. Returns whether a session was removed.
pub fn delete_session(conn: &Connection, token: &str) -> AppResult<bool> {
    let rows = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(rows > 0)
}

pub fn purge_expired(conn: &Connection) -> AppResult<usize> {
    Ok(conn.execute(
        "DELETE FROM sessions WHERE expires_at <= datetime('now')",
        [],
    )?)
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn issued_token_resolves_until_revoked() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");

        let issued = create_session(&conn, &alice, 1).unwrap();
        assert!(!issued.expires_at.is_empty());
        let user = resolve(&conn, &issued.token).unwrap().unwrap();
        assert_eq!(user.id, alice);
        assert_eq!(user.username, "alice");

        assert!(delete_session(&conn, &issued.token).unwrap());
        assert!(resolve(&conn, &issued.token).unwrap().is_none());
        assert!(!delete_session(&conn, &issued.token).unwrap());
    }

    #[test]
    fn expired_tokens_are_rejected_and_purged() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let stale = create_session(&conn, &alice, 1).unwrap();
        let fresh = create_session(&conn, &alice, 1).unwrap();
        conn.execute(
            "UPDATE sessions SET expires_at = datetime('now', '-1 minute') WHERE token = ?1",
            params![stale.token],
        )
        .unwrap();

        assert!(resolve(&conn, &stale.token).unwrap().is_none());
        assert_eq!(purge_expired(&conn).unwrap(), 1);
        assert!(resolve(&conn, &fresh.token).unwrap().is_some());
    }
}
