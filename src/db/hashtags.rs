use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::Hashtag;
use crate::db::new_id;
use crate::error::AppResult;

fn map_hashtag(row: &rusqlite::Row<'_>) -> rusqlite::Result<Hashtag> {
    Ok(Hashtag {
        id: row.get(0)?,
        name: row.get(1)?,
        post_count: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// Link a post to its hashtags, creating unseen tags.
pub fn attach(conn: &Connection, post_id: &str, names: &[String]) -> AppResult<()> {
    for name in names {
        conn.execute(
            "INSERT OR IGNORE INTO hashtags (id, name) VALUES (?1, ?2)",
            params![new_id(), name],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO post_hashtags (hashtag_id, post_id)
             SELECT id, ?2 FROM hashtags WHERE name = ?1",
            params![name, post_id],
        )?;
        conn.execute(
            "UPDATE hashtags SET
                post_count = (SELECT COUNT(*) FROM post_hashtags WHERE hashtag_id = hashtags.id),
                updated_at = datetime('now')
             WHERE name = ?1",
            params![name],
        )?;
    }
    Ok(())
}

/// Replace a post's hashtags after its caption changed.
pub fn replace(conn: &Connection, post_id: &str, names: &[String]) -> AppResult<()> {
    conn.execute(
        "DELETE FROM post_hashtags WHERE post_id = ?1",
        params![post_id],
    )?;
    attach(conn, post_id, names)?;
    recount_all(conn)
}

pub fn recount_all(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "UPDATE hashtags SET post_count =
            (SELECT COUNT(*) FROM post_hashtags WHERE hashtag_id = hashtags.id)",
        [],
    )?;
    Ok(())
}

pub fn find(conn: &Connection, name: &str) -> AppResult<Option<Hashtag>> {
    Ok(conn
        .query_row(
            "SELECT id, name, post_count, created_at, updated_at FROM hashtags WHERE name = ?1",
            params![name.trim_start_matches('#').to_lowercase()],
            map_hashtag,
        )
        .optional()?)
}

pub fn trending(conn: &Connection, limit: usize) -> AppResult<Vec<Hashtag>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, post_count, created_at, updated_at FROM hashtags
         WHERE post_count > 0
         ORDER BY post_count DESC, updated_at DESC LIMIT ?1",
    )?;
    let tags = stmt
        .query_map(params![limit as i64], map_hashtag)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;

    #[test]
    fn posts_increment_and_edits_rebalance_counts() {
        let pool = test_support::pool();
        let conn = pool.get().unwrap();
        let alice = test_support::user(&conn, "alice");
        let p1 = test_support::post(&conn, &alice, "#sun #sea");
        test_support::post(&conn, &alice, "#sun");

        assert_eq!(find(&conn, "#SUN").unwrap().unwrap().post_count, 2);
        assert_eq!(find(&conn, "sea").unwrap().unwrap().post_count, 1);

        replace(&conn, &p1, &["sky".to_string()]).unwrap();
        assert_eq!(find(&conn, "sun").unwrap().unwrap().post_count, 1);
        assert_eq!(find(&conn, "sea").unwrap().unwrap().post_count, 0);

        let top = trending(&conn, 10).unwrap();
        let names: Vec<_> = top.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"sun"));
        assert!(!names.contains(&"sea"));
    }
}
