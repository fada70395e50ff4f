use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{NewPost, Post, PostOwnership, PostUpdate};
use crate::db::users::summary_at;
use crate::db::{hashtags, new_id, users};
use crate::error::{AppError, AppResult};
use crate::text;

/// Post columns plus per-viewer flags. `?1` is always the viewer id.
const POST_SELECT: &str = "SELECT p.id, p.caption, p.filter, p.location, p.is_archived,
        p.is_comments_disabled, p.is_sensitive, p.created_at, p.updated_at,
        (SELECT COUNT(*) FROM post_likes WHERE post_id = p.id),
        (SELECT COUNT(*) FROM comments WHERE post_id = p.id),
        EXISTS(SELECT 1 FROM post_likes WHERE post_id = p.id AND user_id = ?1),
        EXISTS(SELECT 1 FROM saved_posts WHERE post_id = p.id AND user_id = ?1),
        u.id, u.username, u.full_name, u.profile_picture, u.is_verified
     FROM posts p JOIN users u ON u.id = p.user_id";

const NOT_BLOCKED: &str = "NOT EXISTS (SELECT 1 FROM blocks b
        WHERE (b.blocker_id = ?1 AND b.blocked_id = p.user_id)
           OR (b.blocker_id = p.user_id AND b.blocked_id = ?1))";

/// Author is public, is the viewer, or is followed by the viewer.
const AUTHOR_VISIBLE: &str = "(u.is_private = 0 OR p.user_id = ?1
        OR p.user_id IN (SELECT following_id FROM follows WHERE follower_id = ?1))";

const NEWEST_FIRST: &str = "ORDER BY p.created_at DESC, p.rowid DESC";

fn map_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        caption: row.get(1)?,
        filter: row.get(2)?,
        location: row.get(3)?,
        is_archived: row.get(4)?,
        is_comments_disabled: row.get(5)?,
        is_sensitive: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        like_count: row.get(9)?,
        comment_count: row.get(10)?,
        liked_by_me: row.get(11)?,
        saved_by_me: row.get(12)?,
        user: summary_at(row, 13)?,
        images: Vec::new(),
        tags: Vec::new(),
        mentioned_users: Vec::new(),
    })
}

fn column_list(conn: &Connection, sql: &str, post_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let values = stmt
        .query_map(params![post_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(values)
}

fn hydrate(conn: &Connection, mut post: Post) -> AppResult<Post> {
    post.images = column_list(
        conn,
        "SELECT reference FROM post_images WHERE post_id = ?1 ORDER BY position",
        &post.id,
    )?;
    post.tags = column_list(
        conn,
        "SELECT tag FROM post_tags WHERE post_id = ?1 ORDER BY tag",
        &post.id,
    )?;
    post.mentioned_users = column_list(
        conn,
        "SELECT u.username FROM post_mentions m JOIN users u ON u.id = m.user_id
         WHERE m.post_id = ?1 ORDER BY u.username",
        &post.id,
    )?;
    Ok(post)
}

/// Run a post listing. `filter` may reference `?1` (viewer) and `?2` (`arg`).
fn list(
    conn: &Connection,
    viewer_id: &str,
    filter: &str,
    arg: Option<&str>,
    limit: usize,
) -> AppResult<Vec<Post>> {
    let limit = limit as i64;
    let mut bound: Vec<&dyn ToSql> = vec![&viewer_id];
    if let Some(ref arg) = arg {
        bound.push(arg);
    }
    bound.push(&limit);

    let sql = format!(
        "{} WHERE {} AND {} {} LIMIT ?{}",
        POST_SELECT,
        filter,
        NOT_BLOCKED,
        NEWEST_FIRST,
        bound.len()
    );
    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map(bound.as_slice(), map_post)?
        .collect::<Result<Vec<_>, _>>()?;
    posts.into_iter().map(|p| hydrate(conn, p)).collect()
}

/// Insert a post with its images, tags, mentions and hashtags.
/// Callers validate the input and wrap this in a transaction.
pub fn create(conn: &Connection, user_id: &str, new_post: &NewPost) -> AppResult<String> {
    let id = new_id();
    conn.execute(
        "INSERT INTO posts (id, user_id, caption, filter, location, is_sensitive, is_comments_disabled)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            user_id,
            new_post.caption.trim(),
            new_post.filter.as_deref().unwrap_or("normal"),
            new_post.location.as_deref().map(str::trim).filter(|l| !l.is_empty()),
            new_post.is_sensitive,
            new_post.is_comments_disabled,
        ],
    )?;

    for (position, reference) in new_post.images.iter().enumerate() {
        conn.execute(
            "INSERT INTO post_images (post_id, position, reference) VALUES (?1, ?2, ?3)",
            params![id, position as i64, reference.trim()],
        )?;
    }
    for tag in &new_post.tags {
        let tag = tag.trim();
        if !tag.is_empty() {
            conn.execute(
                "INSERT OR IGNORE INTO post_tags (post_id, tag) VALUES (?1, ?2)",
                params![id, tag],
            )?;
        }
    }

    set_mentions(conn, &id, &new_post.caption)?;
    hashtags::attach(conn, &id, &text::hashtags(&new_post.caption))?;
    Ok(id)
}

fn set_mentions(conn: &Connection, post_id: &str, caption: &str) -> AppResult<()> {
    conn.execute(
        "DELETE FROM post_mentions WHERE post_id = ?1",
        params![post_id],
    )?;
    for user_id in users::ids_for_usernames(conn, &text::mentions(caption))? {
        conn.execute(
            "INSERT OR IGNORE INTO post_mentions (post_id, user_id) VALUES (?1, ?2)",
            params![post_id, user_id],
        )?;
    }
    Ok(())
}

pub fn mentioned_user_ids(conn: &Connection, post_id: &str) -> AppResult<Vec<String>> {
    Ok(column_list(
        conn,
        "SELECT user_id FROM post_mentions WHERE post_id = ?1",
        post_id,
    )?)
}

/// Fetch one post as seen by `viewer_id`. Archived posts are only visible
/// to their owner. Posts across a block, and posts by private accounts the
/// viewer does not follow, read as not found.
pub fn get(conn: &Connection, viewer_id: &str, post_id: &str) -> AppResult<Post> {
    let sql = format!(
        "{} WHERE p.id = ?2 AND (p.is_archived = 0 OR p.user_id = ?1) AND {} AND {}",
        POST_SELECT, NOT_BLOCKED, AUTHOR_VISIBLE
    );
    let post = conn
        .query_row(&sql, params![viewer_id, post_id], map_post)
        .optional()?
        .ok_or(AppError::NotFound)?;
    hydrate(conn, post)
}

pub fn ownership(conn: &Connection, post_id: &str) -> AppResult<PostOwnership> {
    conn.query_row(
        "SELECT user_id, is_comments_disabled FROM posts WHERE id = ?1",
        params![post_id],
        |row| {
            Ok(PostOwnership {
                user_id: row.get(0)?,
                is_comments_disabled: row.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

pub fn update(conn: &Connection, post_id: &str, update: &PostUpdate) -> AppResult<()> {
    let location = update
        .location
        .as_deref()
        .map(str::trim)
        .map(|l| if l.is_empty() { None } else { Some(l) });
    conn.execute(
        "UPDATE posts SET
            caption = COALESCE(?2, caption),
            location = CASE WHEN ?3 THEN ?4 ELSE location END,
            is_archived = COALESCE(?5, is_archived),
            is_comments_disabled = COALESCE(?6, is_comments_disabled),
            is_sensitive = COALESCE(?7, is_sensitive),
            updated_at = datetime('now')
         WHERE id = ?1",
        params![
            post_id,
            update.caption.as_deref().map(str::trim),
            location.is_some(),
            location.flatten(),
            update.is_archived,
            update.is_comments_disabled,
            update.is_sensitive,
        ],
    )?;

    if let Some(ref caption) = update.caption {
        set_mentions(conn, post_id, caption)?;
        hashtags::replace(conn, post_id, &text::hashtags(caption))?;
    }
    Ok(())
}

pub fn delete(conn: &Connection, post_id: &str) -> AppResult<()> {
    let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
    if rows == 0 {
        return Err(AppError::NotFound);
    }
    hashtags::recount_all(conn)
}

/// Posts by the viewer and the accounts they follow, newest first.
pub fn feed(conn: &Connection, viewer_id: &str, limit: usize) -> AppResult<Vec<Post>> {
    list(
        conn,
        viewer_id,
        "p.is_archived = 0 AND (p.user_id = ?1
            OR p.user_id IN (SELECT following_id FROM follows WHERE follower_id = ?1))",
        None,
        limit,
    )
}

pub fn explore(conn: &Connection, viewer_id: &str, limit: usize) -> AppResult<Vec<Post>> {
    let filter = format!("p.is_archived = 0 AND {}", AUTHOR_VISIBLE);
    list(conn, viewer_id, &filter, None, limit)
}

pub fn by_user(
    conn: &Connection,
    viewer_id: &str,
    author_id: &str,
    limit: usize,
) -> AppResult<Vec<Post>> {
    list(
        conn,
        viewer_id,
        "p.user_id = ?2 AND (p.is_archived = 0 OR p.user_id = ?1)",
        Some(author_id),
        limit,
    )
}

pub fn by_hashtag(
    conn: &Connection,
    viewer_id: &str,
    name: &str,
    limit: usize,
) -> AppResult<Vec<Post>> {
    let filter = format!(
        "p.is_archived = 0 AND {} AND p.id IN (
            SELECT ph.post_id FROM post_hashtags ph JOIN hashtags h ON h.id = ph.hashtag_id
            WHERE h.name = ?2)",
        AUTHOR_VISIBLE
    );
    let name = name.trim_start_matches('#').to_lowercase();
    list(conn, viewer_id, &filter, Some(name.as_str()), limit)
}

pub fn saved(conn: &Connection, viewer_id: &str, limit: usize) -> AppResult<Vec<Post>> {
    list(
        conn,
        viewer_id,
        &format!(
            "p.is_archived = 0 AND {} AND p.id IN (SELECT post_id FROM saved_posts WHERE user_id = ?1)",
            AUTHOR_VISIBLE
        ),
        None,
        limit,
    )
}

pub fn like_count(conn: &Connection, post_id: &str) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM post_likes WHERE post_id = ?1",
        params![post_id],
        |row| row.get(0),
    )?)
}

/// Add the user to the post's likers. Returns whether the like is new.
pub fn like(conn: &Connection, post_id: &str, user_id: &str) -> AppResult<bool> {
    let rows = conn.execute(
        "INSERT OR IGNORE INTO post_likes (post_id, user_id) VALUES (?1, ?2)",
        params![post_id, user_id],
    )?;
    Ok(rows > 0)
}

pub fn unlike(conn: &Connection, post_id: &str, user_id: &str) -> AppResult<bool> {
    let rows = conn.execute(
        "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
        params![post_id, user_id],
    )?;
    Ok(rows > 0)
}

pub fn save(conn: &Connection, post_id: &str, user_id: &str) -> AppResult<bool> {
    let rows = conn.execute(
        "INSERT OR IGNORE INTO saved_posts (user_id, post_id) VALUES (?1, ?2)",
        params![user_id, post_id],
    )?;
    Ok(rows > 0)
}

pub fn unsave(conn: &Connection, post_id: &str, user_id: &str) -> AppResult<bool> {
    let rows = conn.execute(
        "DELETE FROM saved_posts WHERE user_id = ?1 AND post_id = ?2",
        params![user_id, post_id],
    )?;
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{social, test_support};

    #[test]
    fn create_and_get_round_trips_images_in_order() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let bob = test_support::user(&conn, "bob");

        let id = create(
            &conn,
            &alice,
            &NewPost {
                caption: "Hiking with @bob #outdoors".into(),
                images: vec!["2.jpg".into(), "1.jpg".into()],
                location: Some("Alps".into()),
                tags: vec!["travel".into()],
                ..Default::default()
            },
        )
        .unwrap();

        let post = get(&conn, &bob, &id).unwrap();
        assert_eq!(post.images, vec!["2.jpg", "1.jpg"]);
        assert_eq!(post.user.username, "alice");
        assert_eq!(post.filter, "normal");
        assert_eq!(post.location.as_deref(), Some("Alps"));
        assert_eq!(post.tags, vec!["travel"]);
        assert_eq!(post.mentioned_users, vec!["bob"]);
        assert_eq!(mentioned_user_ids(&conn, &id).unwrap(), vec![bob]);
    }

    #[test]
    fn like_then_unlike_restores_count() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let post = test_support::post(&conn, &alice, "hi");

        let before = like_count(&conn, &post).unwrap();
        assert!(like(&conn, &post, &alice).unwrap());
        assert!(!like(&conn, &post, &alice).unwrap());
        assert_eq!(like_count(&conn, &post).unwrap(), before + 1);

        assert!(unlike(&conn, &post, &alice).unwrap());
        assert!(!unlike(&conn, &post, &alice).unwrap());
        assert_eq!(like_count(&conn, &post).unwrap(), before);
    }

    #[test]
    fn feed_contains_self_and_followed_newest_first() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let bob = test_support::user(&conn, "bob");
        let carol = test_support::user(&conn, "carol");
        social::follow(&conn, &alice, &bob).unwrap();

        let first = test_support::post(&conn, &bob, "bob first");
        let mine = test_support::post(&conn, &alice, "alice");
        test_support::post(&conn, &carol, "carol");

        let feed = feed(&conn, &alice, 50).unwrap();
        let ids: Vec<_> = feed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![mine.as_str(), first.as_str()]);
    }

    #[test]
    fn empty_feed_is_empty_not_error() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        assert!(feed(&conn, &alice, 50).unwrap().is_empty());
    }

    #[test]
    fn archived_posts_are_owner_only() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let bob = test_support::user(&conn, "bob");
        let post = test_support::post(&conn, &alice, "old");
        update(
            &conn,
            &post,
            &PostUpdate {
                is_archived: Some(true),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(get(&conn, &alice, &post).unwrap().is_archived);
        assert!(matches!(get(&conn, &bob, &post), Err(AppError::NotFound)));
        assert!(explore(&conn, &bob, 50).unwrap().is_empty());
    }

    #[test]
    fn explore_hides_private_and_blocked_authors() {
        let pool = test_support::pool();
        let mut conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let bob = test_support::user(&conn, "bob");
        let carol = test_support::user(&conn, "carol");
        test_support::post(&conn, &bob, "bob");
        test_support::post(&conn, &carol, "carol");
        conn.execute("UPDATE users SET is_private = 1 WHERE id = ?1", params![carol])
            .unwrap();

        assert_eq!(explore(&conn, &alice, 50).unwrap().len(), 1);
        social::block(&mut conn, &bob, &alice).unwrap();
        assert!(explore(&conn, &alice, 50).unwrap().is_empty());
    }

    #[test]
    fn update_location_can_be_cleared() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let post = test_support::post(&conn, &alice, "hi");
        update(
            &conn,
            &post,
            &PostUpdate {
                location: Some("Paris".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(get(&conn, &alice, &post).unwrap().location.as_deref(), Some("Paris"));

        update(
            &conn,
            &post,
            &PostUpdate {
                location: Some(String::new()),
                caption: Some("edited #new".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let post = get(&conn, &alice, &post).unwrap();
        assert!(post.location.is_none());
        assert_eq!(post.caption, "edited #new");
        assert_eq!(by_hashtag(&conn, &alice, "new", 10).unwrap().len(), 1);
    }

    #[test]
    fn saved_lists_only_saved_posts() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let p1 = test_support::post(&conn, &alice, "one");
        test_support::post(&conn, &alice, "two");

        assert!(save(&conn, &p1, &alice).unwrap());
        assert!(!save(&conn, &p1, &alice).unwrap());
        let saved_posts = saved(&conn, &alice, 10).unwrap();
        assert_eq!(saved_posts.len(), 1);
        assert!(saved_posts[0].saved_by_me);

        assert!(unsave(&conn, &p1, &alice).unwrap());
        assert!(saved(&conn, &alice, 10).unwrap().is_empty());
    }

    #[test]
    fn delete_removes_post_and_likes() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let post = test_support::post(&conn, &alice, "gone");
        like(&conn, &post, &alice).unwrap();

        delete(&conn, &post).unwrap();
        assert!(matches!(ownership(&conn, &post), Err(AppError::NotFound)));
        let likes: i64 = conn
            .query_row("SELECT COUNT(*) FROM post_likes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(likes, 0);
        assert!(matches!(delete(&conn, &post), Err(AppError::NotFound)));
    }

    #[test]
    fn private_author_posts_need_a_follow() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let carol = test_support::user(&conn, "carol");
        let post = test_support::post(&conn, &carol, "secret");
        save(&conn, &post, &alice).unwrap();
        conn.execute("UPDATE users SET is_private = 1 WHERE id = ?1", [&carol])
            .unwrap();

        assert!(matches!(get(&conn, &alice, &post), Err(AppError::NotFound)));
        assert!(saved(&conn, &alice, 10).unwrap().is_empty());
        assert_eq!(get(&conn, &carol, &post).unwrap().caption, "secret");

        social::follow(&conn, &alice, &carol).unwrap();
        assert_eq!(get(&conn, &alice, &post).unwrap().caption, "secret");
        assert_eq!(saved(&conn, &alice, 10).unwrap().len(), 1);
    }
}
