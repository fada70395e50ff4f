use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{NewUser, NotificationSettings, Profile, ProfileUpdate, User, UserSummary};
use crate::db::new_id;
use crate::error::{conflict_on_unique, AppError, AppResult};

const USER_COLUMNS: &str = "id, username, email, password_hash, full_name, bio, website, \
     profile_picture, is_private, is_verified, notify_likes, notify_comments, notify_follows, \
     notify_messages, last_active, created_at, updated_at";

/// Columns for a [`UserSummary`] when the users table is aliased as `u`.
pub(crate) const SUMMARY_COLUMNS: &str =
    "u.id, u.username, u.full_name, u.profile_picture, u.is_verified";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        full_name: row.get(4)?,
        bio: row.get(5)?,
        website: row.get(6)?,
        profile_picture: row.get(7)?,
        is_private: row.get(8)?,
        is_verified: row.get(9)?,
        notifications: NotificationSettings {
            likes: row.get(10)?,
            comments: row.get(11)?,
            follows: row.get(12)?,
            messages: row.get(13)?,
        },
        last_active: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

/// Read a [`UserSummary`] starting at column `start` (see [`SUMMARY_COLUMNS`]).
pub(crate) fn summary_at(row: &Row<'_>, start: usize) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        id: row.get(start)?,
        username: row.get(start + 1)?,
        full_name: row.get(start + 2)?,
        profile_picture: row.get(start + 3)?,
        is_verified: row.get(start + 4)?,
    })
}

fn find_one(conn: &Connection, clause: &str, value: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, clause);
    Ok(conn.query_row(&sql, params![value], map_user).optional()?)
}

pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<User>> {
    find_one(conn, "id", id)
}

pub fn find_by_username(conn: &Connection, username: &str) -> AppResult<Option<User>> {
    find_one(conn, "username", &username.trim().to_lowercase())
}

/// Look a user up by username or email, case-insensitively.
pub fn find_by_identifier(conn: &Connection, identifier: &str) -> AppResult<Option<User>> {
    let ident = identifier.trim().to_lowercase();
    let sql = format!(
        "SELECT {} FROM users WHERE username = ?1 OR email = ?1",
        USER_COLUMNS
    );
    Ok(conn.query_row(&sql, params![ident], map_user).optional()?)
}

pub fn get(conn: &Connection, id: &str) -> AppResult<User> {
    find_by_id(conn, id)?.ok_or(AppError::NotFound)
}

pub fn create(conn: &Connection, new_user: &NewUser) -> AppResult<User> {
    let username = new_user.username.trim().to_lowercase();
    let email = new_user.email.trim().to_lowercase();

    let taken: Option<String> = conn
        .query_row(
            "SELECT CASE WHEN username = ?1 THEN 'Username' ELSE 'Email' END \
             FROM users WHERE username = ?1 OR email = ?2 LIMIT 1",
            params![username, email],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(field) = taken {
        return Err(AppError::Conflict(format!("{} is already taken", field)));
    }

    let id = new_id();
    conn.execute(
        "INSERT INTO users (id, username, email, password_hash, full_name) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id,
            username,
            email,
            new_user.password_hash,
            new_user.full_name.trim()
        ],
    )
    .map_err(|e| conflict_on_unique(e, "Username or email is already taken"))?;

    get(conn, &id)
}

pub fn update_profile(conn: &Connection, id: &str, update: &ProfileUpdate) -> AppResult<User> {
    let rows = conn.execute(
        "UPDATE users SET
            full_name = COALESCE(?2, full_name),
            bio = COALESCE(?3, bio),
            website = COALESCE(?4, website),
            profile_picture = COALESCE(?5, profile_picture),
            is_private = COALESCE(?6, is_private),
            updated_at = datetime('now')
         WHERE id = ?1",
        params![
            id,
            update.full_name.as_deref().map(str::trim),
            update.bio.as_deref().map(str::trim),
            update.website.as_deref().map(str::trim),
            update.profile_picture,
            update.is_private,
        ],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound);
    }
    get(conn, id)
}

pub fn update_notification_settings(
    conn: &Connection,
    id: &str,
    settings: &NotificationSettings,
) -> AppResult<User> {
    conn.execute(
        "UPDATE users SET notify_likes = ?2, notify_comments = ?3, notify_follows = ?4,
            notify_messages = ?5, updated_at = datetime('now')
         WHERE id = ?1",
        params![
            id,
            settings.likes,
            settings.comments,
            settings.follows,
            settings.messages
        ],
    )?;
    get(conn, id)
}

pub fn notification_settings(conn: &Connection, id: &str) -> AppResult<NotificationSettings> {
    Ok(get(conn, id)?.notifications)
}

pub fn touch_last_active(conn: &Connection, id: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE users SET last_active = datetime('now') WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Delete an account. Owned rows go with it through foreign-key cascades;
/// hashtag counters are recomputed afterwards.
pub fn delete(conn: &mut Connection, id: &str) -> AppResult<()> {
    let tx = conn.transaction()?;
    let rows = tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    if rows == 0 {
        return Err(AppError::NotFound);
    }
    crate::db::hashtags::recount_all(&tx)?;
    tx.commit()?;
    tracing::info!(user_id = %id, "Deleted account");
    Ok(())
}

pub fn profile(conn: &Connection, viewer_id: &str, username: &str) -> AppResult<Profile> {
    let user = find_by_username(conn, username)?.ok_or(AppError::NotFound)?;
    let (follower_count, following_count, post_count, is_following): (i64, i64, i64, bool) = conn
        .query_row(
            "SELECT
                (SELECT COUNT(*) FROM follows WHERE following_id = ?1),
                (SELECT COUNT(*) FROM follows WHERE follower_id = ?1),
                (SELECT COUNT(*) FROM posts WHERE user_id = ?1 AND is_archived = 0),
                EXISTS(SELECT 1 FROM follows WHERE follower_id = ?2 AND following_id = ?1)",
            params![user.id, viewer_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

    Ok(Profile {
        id: user.id,
        username: user.username,
        full_name: user.full_name,
        bio: user.bio,
        website: user.website,
        profile_picture: user.profile_picture,
        is_private: user.is_private,
        is_verified: user.is_verified,
        follower_count,
        following_count,
        post_count,
        is_following,
        created_at: user.created_at,
    })
}

/// Prefix search over usernames and full names.
pub fn search(conn: &Connection, query: &str, limit: usize) -> AppResult<Vec<UserSummary>> {
    let pattern = format!("{}%", query.trim().to_lowercase().replace('%', ""));
    let sql = format!(
        "SELECT {} FROM users u
         WHERE u.username LIKE ?1 OR lower(u.full_name) LIKE ?1
         ORDER BY u.username LIMIT ?2",
        SUMMARY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(params![pattern, limit as i64], |row| summary_at(row, 0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

/// Resolve `@mention` usernames to user ids, skipping unknown names.
pub fn ids_for_usernames(conn: &Connection, usernames: &[String]) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM users WHERE username = ?1")?;
    let mut ids = Vec::new();
    for name in usernames {
        if let Some(id) = stmt
            .query_row(params![name.to_lowercase()], |row| row.get::<_, String>(0))
            .optional()?
        {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            full_name: "Full Name".to_string(),
        }
    }

    #[test]
    fn create_normalizes_and_applies_defaults() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let user = create(&conn, &new_user("  Alice ", "ALICE@Example.com")).unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.profile_picture, "default-profile.jpg");
        assert!(!user.is_private);
        assert_eq!(user.notifications, NotificationSettings::default());
    }

    #[test]
    fn duplicate_username_or_email_conflicts() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        create(&conn, &new_user("alice", "alice@example.com")).unwrap();

        let err = create(&conn, &new_user("ALICE", "other@example.com")).unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m.starts_with("Username")));

        let err = create(&conn, &new_user("bob", "Alice@example.com")).unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m.starts_with("Email")));
    }

    #[test]
    fn find_by_identifier_accepts_username_or_email() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let user = create(&conn, &new_user("alice", "alice@example.com")).unwrap();

        let by_name = find_by_identifier(&conn, "Alice").unwrap().unwrap();
        let by_email = find_by_identifier(&conn, "alice@EXAMPLE.com").unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
        assert_eq!(by_email.id, user.id);
        assert!(find_by_identifier(&conn, "nobody").unwrap().is_none());
    }

    #[test]
    fn update_profile_only_touches_given_fields() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let user = create(&conn, &new_user("alice", "alice@example.com")).unwrap();

        let updated = update_profile(
            &conn,
            &user.id,
            &ProfileUpdate {
                bio: Some("hello".into()),
                is_private: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.bio, "hello");
        assert!(updated.is_private);
        assert_eq!(updated.full_name, "Full Name");
    }

    #[test]
    fn profile_counts_followers_and_posts() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let bob = test_support::user(&conn, "bob");
        test_support::post(&conn, &alice, "first");
        crate::db::social::follow(&conn, &bob, &alice).unwrap();

        let profile = profile(&conn, &bob, "alice").unwrap();
        assert_eq!(profile.follower_count, 1);
        assert_eq!(profile.following_count, 0);
        assert_eq!(profile.post_count, 1);
        assert!(profile.is_following);
    }

    #[test]
    fn delete_cascades_to_owned_posts() {
        let pool = test_support::pool();
        let mut conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        test_support::post(&conn, &alice, "bye #farewell");

        delete(&mut conn, &alice).unwrap();

        let posts: i64 = conn
            .query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))
            .unwrap();
        let tag_count: i64 = conn
            .query_row(
                "SELECT post_count FROM hashtags WHERE name = 'farewell'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(posts, 0);
        assert_eq!(tag_count, 0);
    }

    #[test]
    fn mentions_resolve_known_usernames_once() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let ids = ids_for_usernames(
            &conn,
            &["alice".into(), "ghost".into(), "ALICE".into()],
        )
        .unwrap();
        assert_eq!(ids, vec![alice]);
    }
}
