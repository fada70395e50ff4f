use rusqlite::{params, Connection};

use crate::db::models::UserSummary;
use crate::db::users::{summary_at, SUMMARY_COLUMNS};
use crate::error::{AppError, AppResult};

/// True when either user has blocked the other.
pub fn is_blocked_either(conn: &Connection, a: &str, b: &str) -> AppResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM blocks
            WHERE (blocker_id = ?1 AND blocked_id = ?2)
               OR (blocker_id = ?2 AND blocked_id = ?1))",
        params![a, b],
        |row| row.get(0),
    )?)
}

/// Add a follow edge. Returns whether the edge is new.
pub fn follow(conn: &Connection, follower_id: &str, following_id: &str) -> AppResult<bool> {
    if follower_id == following_id {
        return Err(AppError::BadRequest("You cannot follow yourself".into()));
    }
    if is_blocked_either(conn, follower_id, following_id)? {
        return Err(AppError::Forbidden("You cannot follow this user".into()));
    }
    let rows = conn.execute(
        "INSERT OR IGNORE INTO follows (follower_id, following_id) VALUES (?1, ?2)",
        params![follower_id, following_id],
    )?;
    Ok(rows > 0)
}

pub fn unfollow(conn: &Connection, follower_id: &str, following_id: &str) -> AppResult<bool> {
    let rows = conn.execute(
        "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
        params![follower_id, following_id],
    )?;
    Ok(rows > 0)
}

/// Block a user and drop follow edges in both directions.
pub fn block(conn: &mut Connection, blocker_id: &str, blocked_id: &str) -> AppResult<bool> {
    if blocker_id == blocked_id {
        return Err(AppError::BadRequest("You cannot block yourself".into()));
    }
    let tx = conn.transaction()?;
    let rows = tx.execute(
        "INSERT OR IGNORE INTO blocks (blocker_id, blocked_id) VALUES (?1, ?2)",
        params![blocker_id, blocked_id],
    )?;
    tx.execute(
        "DELETE FROM follows
         WHERE (follower_id = ?1 AND following_id = ?2)
            OR (follower_id = ?2 AND following_id = ?1)",
        params![blocker_id, blocked_id],
    )?;
    tx.commit()?;
    Ok(rows > 0)
}

pub fn unblock(conn: &Connection, blocker_id: &str, blocked_id: &str) -> AppResult<bool> {
    let rows = conn.execute(
        "DELETE FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
        params![blocker_id, blocked_id],
    )?;
    Ok(rows > 0)
}

fn list(conn: &Connection, join_on: &str, filter: &str, user_id: &str) -> AppResult<Vec<UserSummary>> {
    let sql = format!(
        "SELECT {} FROM follows f JOIN users u ON u.id = f.{}
         WHERE f.{} = ?1 ORDER BY f.created_at DESC, u.username",
        SUMMARY_COLUMNS, join_on, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(params![user_id], |row| summary_at(row, 0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn followers(conn: &Connection, user_id: &str) -> AppResult<Vec<UserSummary>> {
    list(conn, "follower_id", "following_id", user_id)
}

pub fn following(conn: &Connection, user_id: &str) -> AppResult<Vec<UserSummary>> {
    list(conn, "following_id", "follower_id", user_id)
}

pub fn blocked(conn: &Connection, user_id: &str) -> AppResult<Vec<UserSummary>> {
    let sql = format!(
        "SELECT {} FROM blocks b JOIN users u ON u.id = b.blocked_id
         WHERE b.blocker_id = ?1 ORDER BY u.username",
        SUMMARY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(params![user_id], |row| summary_at(row, 0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}
