use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{MediaType, NewStory, Story};
use crate::db::users::summary_at;
use crate::db::{new_id, timestamp_after_hours};
use crate::error::{AppError, AppResult};

/// Stories disappear from the active tray this long after posting.
pub const STORY_LIFETIME_HOURS: i64 = 24;

const STORY_SELECT: &str = "SELECT s.id, s.media, s.media_type, s.caption, s.location,
        s.is_highlighted, s.highlight_name, s.expires_at, s.created_at,
        (SELECT COUNT(*) FROM story_views WHERE story_id = s.id),
        EXISTS(SELECT 1 FROM story_views WHERE story_id = s.id AND user_id = ?1),
        u.id, u.username, u.full_name, u.profile_picture, u.is_verified
     FROM stories s JOIN users u ON u.id = s.user_id";

fn map_story(row: &Row<'_>) -> rusqlite::Result<Story> {
    Ok(Story {
        id: row.get(0)?,
        media: row.get(1)?,
        media_type: row.get(2)?,
        caption: row.get(3)?,
        location: row.get(4)?,
        is_highlighted: row.get(5)?,
        highlight_name: row.get(6)?,
        expires_at: row.get(7)?,
        created_at: row.get(8)?,
        view_count: row.get(9)?,
        viewed_by_me: row.get(10)?,
        user: summary_at(row, 11)?,
    })
}

pub fn create(conn: &Connection, user_id: &str, story: &NewStory) -> AppResult<String> {
    let media_type = story.media_type.unwrap_or(MediaType::Image);
    if media_type == MediaType::Audio {
        return Err(AppError::BadRequest(
            "Stories support image or video media".into(),
        ));
    }

    let id = new_id();
    conn.execute(
        "INSERT INTO stories (id, user_id, media, media_type, caption, location,
            is_highlighted, highlight_name, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id,
            user_id,
            story.media.trim(),
            media_type,
            story.caption,
            story.location,
            story.is_highlighted,
            story.highlight_name,
            timestamp_after_hours(STORY_LIFETIME_HOURS),
        ],
    )?;
    Ok(id)
}

pub fn get(conn: &Connection, viewer_id: &str, story_id: &str) -> AppResult<Story> {
    let sql = format!(
        "{} WHERE s.id = ?2 AND (s.expires_at > datetime('now') OR s.is_highlighted = 1)",
        STORY_SELECT
    );
    conn.query_row(&sql, params![viewer_id, story_id], map_story)
        .optional()?
        .ok_or(AppError::NotFound)
}

pub fn owner(conn: &Connection, story_id: &str) -> AppResult<String> {
    conn.query_row(
        "SELECT user_id FROM stories WHERE id = ?1",
        params![story_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

/// Unexpired stories from the viewer and the accounts they follow.
pub fn active_for(conn: &Connection, viewer_id: &str) -> AppResult<Vec<Story>> {
    let sql = format!(
        "{} WHERE s.expires_at > datetime('now')
            AND (s.user_id = ?1
                 OR s.user_id IN (SELECT following_id FROM follows WHERE follower_id = ?1))
         ORDER BY s.user_id = ?1 DESC, s.created_at, s.rowid",
        STORY_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let stories = stmt
        .query_map(params![viewer_id], map_story)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(stories)
}

pub fn highlights(conn: &Connection, viewer_id: &str, user_id: &str) -> AppResult<Vec<Story>> {
    let sql = format!(
        "{} WHERE s.user_id = ?2 AND s.is_highlighted = 1 ORDER BY s.created_at DESC",
        STORY_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let stories = stmt
        .query_map(params![viewer_id, user_id], map_story)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(stories)
}

pub fn record_view(conn: &Connection, story_id: &str, viewer_id: &str) -> AppResult<bool> {
    let rows = conn.execute(
        "INSERT OR IGNORE INTO story_views (story_id, user_id) VALUES (?1, ?2)",
        params![story_id, viewer_id],
    )?;
    Ok(rows > 0)
}

pub fn delete(conn: &Connection, story_id: &str) -> AppResult<()> {
    conn.execute("DELETE FROM stories WHERE id = ?1", params![story_id])?;
    Ok(())
}

/// Remove expired stories that were not kept as highlights.
pub fn purge_expired(conn: &Connection) -> AppResult<usize> {
    Ok(conn.execute(
        "DELETE FROM stories WHERE expires_at <= datetime('now') AND is_highlighted = 0",
        [],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{social, test_support};

    fn story(media: &str) -> NewStory {
        NewStory {
            media: media.into(),
            ..Default::default()
        }
    }

    #[test]
    fn active_tray_covers_self_and_followed() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let bob = test_support::user(&conn, "bob");
        let carol = test_support::user(&conn, "carol");
        social::follow(&conn, &alice, &bob).unwrap();

        let bobs = create(&conn, &bob, &story("bob.jpg")).unwrap();
        let mine = create(&conn, &alice, &story("me.jpg")).unwrap();
        create(&conn, &carol, &story("carol.jpg")).unwrap();

        let tray = active_for(&conn, &alice).unwrap();
        let ids: Vec<_> = tray.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![mine.as_str(), bobs.as_str()]);
        assert_eq!(tray[0].media_type, MediaType::Image);
    }

    #[test]
    fn expired_stories_hidden_and_purged_unless_highlighted() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let gone = create(&conn, &alice, &story("old.jpg")).unwrap();
        let kept = create(
            &conn,
            &alice,
            &NewStory {
                media: "best.jpg".into(),
                is_highlighted: true,
                highlight_name: Some("Summer".into()),
                ..Default::default()
            },
        )
        .unwrap();
        conn.execute(
            "UPDATE stories SET expires_at = datetime('now', '-1 hour')",
            [],
        )
        .unwrap();

        assert!(active_for(&conn, &alice).unwrap().is_empty());
        assert!(matches!(get(&conn, &alice, &gone), Err(AppError::NotFound)));
        assert_eq!(purge_expired(&conn).unwrap(), 1);
        assert_eq!(highlights(&conn, &alice, &alice).unwrap()[0].id, kept);
    }

    #[test]
    fn views_are_counted_once() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let bob = test_support::user(&conn, "bob");
        let s = create(&conn, &alice, &story("a.jpg")).unwrap();

        assert!(record_view(&conn, &s, &bob).unwrap());
        assert!(!record_view(&conn, &s, &bob).unwrap());
        let seen = get(&conn, &bob, &s).unwrap();
        assert_eq!(seen.view_count, 1);
        assert!(seen.viewed_by_me);
    }

    #[test]
    fn audio_stories_are_rejected() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let result = create(
            &conn,
            &alice,
            &NewStory {
                media: "a.mp3".into(),
                media_type: Some(MediaType::Audio),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
