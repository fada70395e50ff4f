use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::Comment;
use crate::db::new_id;
use crate::db::users::summary_at;
use crate::error::{AppError, AppResult};

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.text, c.parent_comment_id, c.is_edited,
        c.created_at, c.updated_at,
        (SELECT COUNT(*) FROM comment_likes WHERE comment_id = c.id),
        (SELECT COUNT(*) FROM comments r WHERE r.parent_comment_id = c.id),
        EXISTS(SELECT 1 FROM comment_likes WHERE comment_id = c.id AND user_id = ?1),
        u.id, u.username, u.full_name, u.profile_picture, u.is_verified
     FROM comments c JOIN users u ON u.id = c.user_id";

fn map_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        text: row.get(2)?,
        parent_comment: row.get(3)?,
        is_edited: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        like_count: row.get(7)?,
        reply_count: row.get(8)?,
        liked_by_me: row.get(9)?,
        user: summary_at(row, 10)?,
    })
}

/// Owner and parent post of a comment.
pub struct CommentRef {
    pub user_id: String,
    pub post_id: String,
}

pub fn create(
    conn: &Connection,
    post_id: &str,
    user_id: &str,
    text: &str,
    parent_comment: Option<&str>,
) -> AppResult<String> {
    if let Some(parent_id) = parent_comment {
        let parent = lookup(conn, parent_id)?;
        if parent.post_id != post_id {
            return Err(AppError::BadRequest(
                "Parent comment belongs to a different post".into(),
            ));
        }
    }

    let id = new_id();
    conn.execute(
        "INSERT INTO comments (id, post_id, user_id, text, parent_comment_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, post_id, user_id, text.trim(), parent_comment],
    )?;
    Ok(id)
}

pub fn lookup(conn: &Connection, comment_id: &str) -> AppResult<CommentRef> {
    conn.query_row(
        "SELECT user_id, post_id FROM comments WHERE id = ?1",
        params![comment_id],
        |row| {
            Ok(CommentRef {
                user_id: row.get(0)?,
                post_id: row.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

pub fn get(conn: &Connection, viewer_id: &str, comment_id: &str) -> AppResult<Comment> {
    let sql = format!("{} WHERE c.id = ?2", COMMENT_SELECT);
    conn.query_row(&sql, params![viewer_id, comment_id], map_comment)
        .optional()?
        .ok_or(AppError::NotFound)
}

/// Comments on a post in the order they were written.
pub fn for_post(conn: &Connection, viewer_id: &str, post_id: &str) -> AppResult<Vec<Comment>> {
    let sql = format!(
        "{} WHERE c.post_id = ?2 ORDER BY c.created_at, c.rowid",
        COMMENT_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let comments = stmt
        .query_map(params![viewer_id, post_id], map_comment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

pub fn update_text(conn: &Connection, comment_id: &str, text: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE comments SET text = ?2, is_edited = 1, updated_at = datetime('now') WHERE id = ?1",
        params![comment_id, text.trim()],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, comment_id: &str) -> AppResult<()> {
    let rows = conn.execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
    if rows == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub fn like(conn: &Connection, comment_id: &str, user_id: &str) -> AppResult<bool> {
    let rows = conn.execute(
        "INSERT OR IGNORE INTO comment_likes (comment_id, user_id) VALUES (?1, ?2)",
        params![comment_id, user_id],
    )?;
    Ok(rows > 0)
}

pub fn unlike(conn: &Connection, comment_id: &str, user_id: &str) -> AppResult<bool> {
    let rows = conn.execute(
        "DELETE FROM comment_likes WHERE comment_id = ?1 AND user_id = ?2",
        params![comment_id, user_id],
    )?;
    Ok(rows > 0)
}

pub fn like_count(conn: &Connection, comment_id: &str) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?1",
        params![comment_id],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;

    #[test]
    fn threads_and_counts() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let bob = test_support::user(&conn, "bob");
        let post = test_support::post(&conn, &alice, "hi");

        let top = create(&conn, &post, &bob, " nice ", None).unwrap();
        let reply = create(&conn, &post, &alice, "thanks", Some(top.as_str())).unwrap();
        like(&conn, &top, &alice).unwrap();

        let comments = for_post(&conn, &alice, &post).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].id, top);
        assert_eq!(comments[0].text, "nice");
        assert_eq!(comments[0].reply_count, 1);
        assert_eq!(comments[0].like_count, 1);
        assert!(comments[0].liked_by_me);
        assert_eq!(comments[1].parent_comment.as_deref(), Some(top.as_str()));

        let post_view = crate::db::posts::get(&conn, &bob, &post).unwrap();
        assert_eq!(post_view.comment_count, 2);

        delete(&conn, &top).unwrap();
        assert!(matches!(lookup(&conn, &reply), Err(AppError::NotFound)));
    }

    #[test]
    fn parent_must_be_on_same_post() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let p1 = test_support::post(&conn, &alice, "one");
        let p2 = test_support::post(&conn, &alice, "two");
        let c1 = create(&conn, &p1, &alice, "first", None).unwrap();

        assert!(matches!(
            create(&conn, &p2, &alice, "wrong", Some(c1.as_str())),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            create(&conn, &p2, &alice, "ghost", Some("missing")),
            Err(AppError::NotFound)
        ));
    }

    #[test]
    fn editing_marks_comment_edited() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let post = test_support::post(&conn, &alice, "hi");
        let c = create(&conn, &post, &alice, "tpyo", None).unwrap();

        update_text(&conn, &c, "typo").unwrap();
        let comment = get(&conn, &alice, &c).unwrap();
        assert_eq!(comment.text, "typo");
        assert!(comment.is_edited);
    }
}
