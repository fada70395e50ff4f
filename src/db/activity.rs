use rusqlite::{params, Connection};

use crate::db::models::{Activity, ActivityKind, ActivityRefs, ClientMeta};
use crate::db::new_id;
use crate::error::AppResult;

pub fn record(
    conn: &Connection,
    user_id: &str,
    kind: ActivityKind,
    refs: &ActivityRefs<'_>,
    client: &ClientMeta,
) -> AppResult<String> {
    let id = new_id();
    conn.execute(
        "INSERT INTO activities (id, user_id, kind, post_id, comment_id, target_user_id,
            ip_address, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            user_id,
            kind,
            refs.post_id,
            refs.comment_id,
            refs.target_user_id,
            client.ip_address,
            client.user_agent,
        ],
    )?;
    Ok(id)
}

/// Record an activity without failing the surrounding request.
pub fn track(
    conn: &Connection,
    user_id: &str,
    kind: ActivityKind,
    refs: ActivityRefs<'_>,
    client: &ClientMeta,
) {
    if let Err(e) = record(conn, user_id, kind, &refs, client) {
        tracing::warn!(%user_id, %kind, "Failed to record activity: {}", e);
    }
}

pub fn recent(conn: &Connection, user_id: &str, limit: usize) -> AppResult<Vec<Activity>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, kind, post_id, comment_id, target_user_id, ip_address,
            user_agent, created_at
         FROM activities WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT ?2",
    )?;
    let activities = stmt
        .query_map(params![user_id, limit as i64], |row| {
            Ok(Activity {
                id: row.get(0)?,
                user_id: row.get(1)?,
                kind: row.get(2)?,
                post_id: row.get(3)?,
                comment_id: row.get(4)?,
                target_user_id: row.get(5)?,
                ip_address: row.get(6)?,
                user_agent: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(activities)
}
