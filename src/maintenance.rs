use std::time::Duration;

use crate::auth::session;
use crate::db::stories;
use crate::error::AppResult;
use crate::state::DbPool;

/// Rows removed by one maintenance pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub sessions: usize,
    pub stories: usize,
}

/// Delete expired sessions and expired, non-highlighted stories.
pub fn purge_expired(pool: &DbPool) -> AppResult<PurgeReport> {
    let conn = pool.get()?;
    Ok(PurgeReport {
        sessions: session::purge_expired(&conn)?,
        stories: stories::purge_expired(&conn)?,
    })
}

/// Run [`purge_expired`] every `interval` until the task is dropped.
pub fn spawn(pool: DbPool, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let pool = pool.clone();
            match tokio::task::spawn_blocking(move || purge_expired(&pool)).await {
                Ok(Ok(report)) if report != PurgeReport::default() => {
                    tracing::info!(
                        sessions = report.sessions,
                        stories = report.stories,
                        "Purged expired rows"
                    );
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!("Maintenance pass failed: {}", e),
                Err(e) => tracing::error!("Maintenance task panicked: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NewStory;
    use crate::db::test_support;

    #[test]
    fn purges_only_expired_rows() {
        let pool = test_support::pool();
        {
            let conn = pool.get().unwrap();
            let alice = test_support::user(&conn, "alice");
            session::create_session(&conn, &alice, 1).unwrap();
            session::create_session(&conn, &alice, 1).unwrap();
            stories::create(
                &conn,
                &alice,
                &NewStory {
                    media: "a.jpg".into(),
                    ..Default::default()
                },
            )
            .unwrap();
            conn.execute_batch(
                "UPDATE sessions SET expires_at = datetime('now', '-1 hour')
                    WHERE rowid = (SELECT MIN(rowid) FROM sessions);
                 UPDATE stories SET expires_at = datetime('now', '-1 hour');",
            )
            .unwrap();
        }

        let report = purge_expired(&pool).unwrap();
        assert_eq!(report, PurgeReport { sessions: 1, stories: 1 });
        assert_eq!(purge_expired(&pool).unwrap(), PurgeReport::default());
    }
}
