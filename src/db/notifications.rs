use rusqlite::{params, Connection, Row};

use crate::db::models::{Notification, NotificationKind, NotificationTarget};
use crate::db::users::summary_at;
use crate::db::{new_id, social, users};
use crate::error::{AppError, AppResult};

fn map_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        kind: row.get(2)?,
        post_id: row.get(3)?,
        comment_id: row.get(4)?,
        message_id: row.get(5)?,
        is_read: row.get(6)?,
        created_at: row.get(7)?,
        sender: summary_at(row, 8)?,
    })
}

/// Record a notification unless it is self-inflicted, muted by the
/// recipient's preferences, or crosses a block. Returns the new id.
pub fn notify(
    conn: &Connection,
    recipient_id: &str,
    sender_id: &str,
    kind: NotificationKind,
    target: &NotificationTarget<'_>,
) -> AppResult<Option<String>> {
    if recipient_id == sender_id {
        return Ok(None);
    }
    if !users::notification_settings(conn, recipient_id)?.allows(kind) {
        return Ok(None);
    }
    if social::is_blocked_either(conn, recipient_id, sender_id)? {
        return Ok(None);
    }

    let id = new_id();
    conn.execute(
        "INSERT INTO notifications (id, recipient_id, sender_id, kind, post_id, comment_id, message_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            recipient_id,
            sender_id,
            kind,
            target.post_id,
            target.comment_id,
            target.message_id
        ],
    )?;
    tracing::debug!(%recipient_id, %kind, "Notification created");
    Ok(Some(id))
}

/// Withdraw notifications for an action that was undone (unlike, unfollow).
pub fn retract(
    conn: &Connection,
    recipient_id: &str,
    sender_id: &str,
    kind: NotificationKind,
    post_id: Option<&str>,
) -> AppResult<usize> {
    Ok(conn.execute(
        "DELETE FROM notifications
         WHERE recipient_id = ?1 AND sender_id = ?2 AND kind = ?3
           AND (?4 IS NULL OR post_id = ?4)",
        params![recipient_id, sender_id, kind, post_id],
    )?)
}

pub fn list(conn: &Connection, user_id: &str, limit: usize) -> AppResult<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT n.id, n.recipient_id, n.kind, n.post_id, n.comment_id, n.message_id,
            n.is_read, n.created_at,
            u.id, u.username, u.full_name, u.profile_picture, u.is_verified
         FROM notifications n JOIN users u ON u.id = n.sender_id
         WHERE n.recipient_id = ?1
         ORDER BY n.created_at DESC, n.rowid DESC LIMIT ?2",
    )?;
    let notifications = stmt
        .query_map(params![user_id, limit as i64], map_notification)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(notifications)
}

pub fn unread_count(conn: &Connection, user_id: &str) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0",
        params![user_id],
        |row| row.get(0),
    )?)
}

pub fn mark_read(conn: &Connection, user_id: &str, notification_id: &str) -> AppResult<()> {
    let rows = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND recipient_id = ?2",
        params![notification_id, user_id],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub fn mark_all_read(conn: &Connection, user_id: &str) -> AppResult<usize> {
    Ok(conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0",
        params![user_id],
    )?)
}
