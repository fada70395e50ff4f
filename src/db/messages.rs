use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{Conversation, Message, NewMessage};
use crate::db::users::{summary_at, SUMMARY_COLUMNS};
use crate::db::{new_id, social, users};
use crate::error::{AppError, AppResult};

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, recipient_id, text, media, \
     media_type, reply_to, is_read, is_liked, is_deleted, created_at";

fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        recipient_id: row.get(3)?,
        text: row.get(4)?,
        media: row.get(5)?,
        media_type: row.get(6)?,
        reply_to: row.get(7)?,
        is_read: row.get(8)?,
        is_liked: row.get(9)?,
        is_deleted: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn find_direct_conversation(conn: &Connection, a: &str, b: &str) -> AppResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT c.id FROM conversations c
             WHERE c.is_group = 0
               AND EXISTS(SELECT 1 FROM conversation_participants
                          WHERE conversation_id = c.id AND user_id = ?1)
               AND EXISTS(SELECT 1 FROM conversation_participants
                          WHERE conversation_id = c.id AND user_id = ?2)
             LIMIT 1",
            params![a, b],
            |row| row.get(0),
        )
        .optional()?)
}

/// Send a direct message, creating the conversation on first contact.
pub fn send(conn: &mut Connection, sender_id: &str, new_message: &NewMessage) -> AppResult<Message> {
    let text = non_empty(&new_message.text);
    let media = non_empty(&new_message.media);
    if text.is_none() && media.is_none() {
        return Err(AppError::BadRequest("Message needs text or media".into()));
    }
    if media.is_none() && new_message.media_type.is_some() {
        return Err(AppError::BadRequest("media_type given without media".into()));
    }
    if new_message.recipient == sender_id {
        return Err(AppError::BadRequest("You cannot message yourself".into()));
    }
    users::get(conn, &new_message.recipient)?;
    if social::is_blocked_either(conn, sender_id, &new_message.recipient)? {
        return Err(AppError::Forbidden("You cannot message this user".into()));
    }

    let tx = conn.transaction()?;
    let conversation_id = match find_direct_conversation(&tx, sender_id, &new_message.recipient)? {
        Some(id) => id,
        None => {
            let id = new_id();
            tx.execute("INSERT INTO conversations (id) VALUES (?1)", params![id])?;
            for participant in [sender_id, new_message.recipient.as_str()] {
                tx.execute(
                    "INSERT INTO conversation_participants (conversation_id, user_id)
                     VALUES (?1, ?2)",
                    params![id, participant],
                )?;
            }
            id
        }
    };

    if let Some(ref reply_to) = new_message.reply_to {
        let same_conversation: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?1 AND conversation_id = ?2)",
            params![reply_to, conversation_id],
            |row| row.get(0),
        )?;
        if !same_conversation {
            return Err(AppError::BadRequest(
                "Reply target is not in this conversation".into(),
            ));
        }
    }

    let id = new_id();
    tx.execute(
        "INSERT INTO messages (id, conversation_id, sender_id, recipient_id, text, media,
            media_type, reply_to)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            conversation_id,
            sender_id,
            new_message.recipient,
            text,
            media,
            new_message.media_type,
            new_message.reply_to,
        ],
    )?;
    tx.execute(
        "UPDATE conversations SET last_message_id = ?2, updated_at = datetime('now') WHERE id = ?1",
        params![conversation_id, id],
    )?;
    tx.execute(
        "UPDATE conversation_participants SET unread_count = unread_count + 1
         WHERE conversation_id = ?1 AND user_id = ?2",
        params![conversation_id, new_message.recipient],
    )?;
    tx.commit()?;

    get(conn, &id)
}

pub fn get(conn: &Connection, message_id: &str) -> AppResult<Message> {
    let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
    conn.query_row(&sql, params![message_id], map_message)
        .optional()?
        .ok_or(AppError::NotFound)
}

pub fn is_participant(conn: &Connection, conversation_id: &str, user_id: &str) -> AppResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM conversation_participants
            WHERE conversation_id = ?1 AND user_id = ?2)",
        params![conversation_id, user_id],
        |row| row.get(0),
    )?)
}

fn ensure_participant(conn: &Connection, conversation_id: &str, user_id: &str) -> AppResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
        params![conversation_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(AppError::NotFound);
    }
    if !is_participant(conn, conversation_id, user_id)? {
        return Err(AppError::Forbidden(
            "You are not part of this conversation".into(),
        ));
    }
    Ok(())
}

fn load_conversation(conn: &Connection, conversation_id: &str) -> AppResult<Conversation> {
    let (is_group, group_name, group_icon, last_message_id, created_at, updated_at) = conn
        .query_row(
            "SELECT is_group, group_name, group_icon, last_message_id, created_at, updated_at
             FROM conversations WHERE id = ?1",
            params![conversation_id],
            |row| {
                Ok((
                    row.get::<_, bool>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?
        .ok_or(AppError::NotFound)?;

    let sql = format!(
        "SELECT {}, cp.unread_count FROM conversation_participants cp
         JOIN users u ON u.id = cp.user_id
         WHERE cp.conversation_id = ?1 ORDER BY u.username",
        SUMMARY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![conversation_id], |row| {
            Ok((summary_at(row, 0)?, row.get::<_, i64>(5)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut unread_count = HashMap::new();
    let mut participants = Vec::with_capacity(rows.len());
    for (summary, unread) in rows {
        unread_count.insert(summary.id.clone(), unread);
        participants.push(summary);
    }

    let last_message = match last_message_id {
        Some(id) => Some(get(conn, &id)?).filter(|m| !m.is_deleted),
        None => None,
    };

    Ok(Conversation {
        id: conversation_id.to_string(),
        participants,
        last_message,
        is_group,
        group_name,
        group_icon,
        unread_count,
        created_at,
        updated_at,
    })
}

pub fn conversation(conn: &Connection, user_id: &str, conversation_id: &str) -> AppResult<Conversation> {
    ensure_participant(conn, conversation_id, user_id)?;
    load_conversation(conn, conversation_id)
}

/// The user's conversations, most recently active first.
pub fn conversations_for(conn: &Connection, user_id: &str) -> AppResult<Vec<Conversation>> {
    let mut stmt = conn.prepare(
        "SELECT c.id FROM conversations c
         JOIN conversation_participants cp ON cp.conversation_id = c.id
         WHERE cp.user_id = ?1
         ORDER BY c.updated_at DESC, c.rowid DESC",
    )?;
    let ids = stmt
        .query_map(params![user_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    ids.iter().map(|id| load_conversation(conn, id)).collect()
}

/// Visible messages in a conversation, oldest first.
pub fn messages(
    conn: &Connection,
    user_id: &str,
    conversation_id: &str,
    limit: usize,
) -> AppResult<Vec<Message>> {
    ensure_participant(conn, conversation_id, user_id)?;
    let sql = format!(
        "SELECT * FROM (
            SELECT {cols}, rowid AS seq FROM messages
            WHERE conversation_id = ?1 AND is_deleted = 0
            ORDER BY created_at DESC, rowid DESC LIMIT ?2
         ) ORDER BY created_at, seq",
        cols = MESSAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let messages = stmt
        .query_map(params![conversation_id, limit as i64], map_message)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(messages)
}

/// Mark the user's incoming messages read and zero their unread counter.
pub fn mark_read(conn: &Connection, user_id: &str, conversation_id: &str) -> AppResult<usize> {
    let rows = conn.execute(
        "UPDATE messages SET is_read = 1
         WHERE conversation_id = ?1 AND recipient_id = ?2 AND is_read = 0",
        params![conversation_id, user_id],
    )?;
    conn.execute(
        "UPDATE conversation_participants SET unread_count = 0
         WHERE conversation_id = ?1 AND user_id = ?2",
        params![conversation_id, user_id],
    )?;
    Ok(rows)
}

/// Soft-delete a message. Only its sender may do so.
pub fn delete(conn: &Connection, user_id: &str, message_id: &str) -> AppResult<()> {
    let message = get(conn, message_id)?;
    if message.sender_id != user_id {
        return Err(AppError::Forbidden("You can only delete your own messages".into()));
    }
    conn.execute(
        "UPDATE messages SET is_deleted = 1 WHERE id = ?1",
        params![message_id],
    )?;
    if !message.is_read {
        conn.execute(
            "UPDATE conversation_participants SET unread_count = MAX(unread_count - 1, 0)
             WHERE conversation_id = ?1 AND user_id = ?2",
            params![message.conversation_id, message.recipient_id],
        )?;
    }
    Ok(())
}

/// Heart or un-heart a received message.
pub fn set_liked(conn: &Connection, user_id: &str, message_id: &str, liked: bool) -> AppResult<Message> {
    let message = get(conn, message_id)?;
    if message.recipient_id != user_id || message.is_deleted {
        return Err(AppError::Forbidden("You can only like messages sent to you".into()));
    }
    conn.execute(
        "UPDATE messages SET is_liked = ?2 WHERE id = ?1",
        params![message_id, liked],
    )?;
    get(conn, message_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;

    fn text_to(recipient: &str, text: &str) -> NewMessage {
        NewMessage {
            recipient: recipient.to_string(),
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn messages_share_one_conversation_and_count_unread() {
        let pool = test_support::pool();
        let mut conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let bob = test_support::user(&conn, "bob");

        let m1 = send(&mut conn, &alice, &text_to(&bob, "hi")).unwrap();
        let m2 = send(&mut conn, &alice, &text_to(&bob, "you there?")).unwrap();
        let reply = send(&mut conn, &bob, &text_to(&alice, "yes")).unwrap();
        assert_eq!(m1.conversation_id, m2.conversation_id);
        assert_eq!(m1.conversation_id, reply.conversation_id);

        let convo = conversation(&conn, &bob, &m1.conversation_id).unwrap();
        assert_eq!(convo.participants.len(), 2);
        assert_eq!(convo.unread_count[&bob], 2);
        assert_eq!(convo.unread_count[&alice], 1);
        assert_eq!(convo.last_message.unwrap().id, reply.id);

        assert_eq!(mark_read(&conn, &bob, &m1.conversation_id).unwrap(), 2);
        let convo = conversation(&conn, &bob, &m1.conversation_id).unwrap();
        assert_eq!(convo.unread_count[&bob], 0);
        assert_eq!(convo.unread_count[&alice], 1);

        let thread = messages(&conn, &bob, &m1.conversation_id, 50).unwrap();
        let texts: Vec<_> = thread.iter().filter_map(|m| m.text.as_deref()).collect();
        assert_eq!(texts, vec!["hi", "you there?", "yes"]);
        assert!(thread[0].is_read);
    }

    #[test]
    fn outsiders_cannot_read_conversation() {
        let pool = test_support::pool();
        let mut conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let bob = test_support::user(&conn, "bob");
        let eve = test_support::user(&conn, "eve");
        let m = send(&mut conn, &alice, &text_to(&bob, "secret")).unwrap();

        assert!(matches!(
            messages(&conn, &eve, &m.conversation_id, 50),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            conversation(&conn, &eve, "missing"),
            Err(AppError::NotFound)
        ));
        assert!(conversations_for(&conn, &eve).unwrap().is_empty());
    }

    #[test]
    fn empty_or_blocked_messages_are_rejected() {
        let pool = test_support::pool();
        let mut conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let bob = test_support::user(&conn, "bob");

        assert!(matches!(
            send(&mut conn, &alice, &text_to(&bob, "   ")),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            send(&mut conn, &alice, &text_to("nobody", "hi")),
            Err(AppError::NotFound)
        ));

        social::block(&mut conn, &bob, &alice).unwrap();
        assert!(matches!(
            send(&mut conn, &alice, &text_to(&bob, "hello?")),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn sender_soft_deletes_and_unread_is_adjusted() {
        let pool = test_support::pool();
        let mut conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let bob = test_support::user(&conn, "bob");
        let m = send(&mut conn, &alice, &text_to(&bob, "oops")).unwrap();

        assert!(matches!(
            delete(&conn, &bob, &m.id),
            Err(AppError::Forbidden(_))
        ));
        delete(&conn, &alice, &m.id).unwrap();

        let convo = conversation(&conn, &bob, &m.conversation_id).unwrap();
        assert_eq!(convo.unread_count[&bob], 0);
        assert!(convo.last_message.is_none());
        assert!(messages(&conn, &bob, &m.conversation_id, 50)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn only_recipient_can_like() {
        let pool = test_support::pool();
        let mut conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let bob = test_support::user(&conn, "bob");
        let m = send(&mut conn, &alice, &text_to(&bob, "<3")).unwrap();

        assert!(set_liked(&conn, &bob, &m.id, true).unwrap().is_liked);
        assert!(matches!(
            set_liked(&conn, &alice, &m.id, true),
            Err(AppError::Forbidden(_))
        ));
    }
}
