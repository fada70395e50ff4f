pub mod activity;
pub mod comments;
pub mod hashtags;
pub mod messages;
pub mod models;
pub mod notifications;
pub mod posts;
pub mod social;
pub mod stories;
pub mod users;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

use crate::state::DbPool;

/// Timestamp layout shared with SQLite's `datetime('now')` so stored values
/// compare correctly as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const MIGRATIONS: &[(&str, &str)] = &[
    ("001_users", include_str!("../../migrations/001_users.sql")),
    ("002_content", include_str!("../../migrations/002_content.sql")),
    (
        "003_messaging",
        include_str!("../../migrations/003_messaging.sql"),
    ),
];

const CONNECTION_PRAGMAS: &str = "
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
";

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path)
        .with_init(|conn| conn.execute_batch(CONNECTION_PRAGMAS));
    let pool = Pool::builder().max_size(8).build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;

    Ok(pool)
}

/// Single-connection in-memory pool, used by tests.
pub fn memory_pool() -> anyhow::Result<DbPool> {
    let manager =
        SqliteConnectionManager::memory().with_init(|conn| conn.execute_batch(CONNECTION_PRAGMAS));
    Ok(Pool::builder().max_size(1).build(manager)?)
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}

pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

pub(crate) fn timestamp_after_hours(hours: i64) -> String {
    (chrono::Utc::now() + chrono::Duration::hours(hours))
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::models::NewUser;

    pub fn pool() -> DbPool {
        let pool = memory_pool().unwrap();
        run_migrations(&pool).unwrap();
        pool
    }

    pub fn user(conn: &rusqlite::Connection, username: &str) -> String {
        users::create(
            conn,
            &NewUser {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                password_hash: "x".to_string(),
                full_name: String::new(),
            },
        )
        .unwrap()
        .id
    }

    pub fn post(conn: &rusqlite::Connection, user_id: &str, caption: &str) -> String {
        posts::create(
            conn,
            user_id,
            &models::NewPost {
                caption: caption.to_string(),
                images: vec!["a.jpg".to_string()],
                ..Default::default()
            },
        )
        .unwrap()
    }
}
