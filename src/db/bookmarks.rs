use rusqlite::{params, Connection};

use crate::db::is_constraint_violation;

/// Flip the bookmark for (post, user) and return the new state.
///
/// Read-then-write: two concurrent toggles can both see no row. The loser's
/// insert hits UNIQUE(post_id, user_id) and reports `true`, since the row
/// exists once the call returns.
pub fn toggle(conn: &Connection, post_id: &str, user_id: &str) -> rusqlite::Result<bool> {
    if is_bookmarked(conn, post_id, user_id)? {
        conn.execute(
            "DELETE FROM bookmarks WHERE post_id = ?1 AND user_id = ?2",
            params![post_id, user_id],
        )?;
        return Ok(false);
    }

    let id = uuid::Uuid::now_v7().to_string();
    match conn.execute(
        "INSERT INTO bookmarks (id, post_id, user_id) VALUES (?1, ?2, ?3)",
        params![id, post_id, user_id],
    ) {
        Ok(_) => Ok(true),
        Err(e) if is_constraint_violation(&e) && is_bookmarked(conn, post_id, user_id)? => {
            tracing::debug!(post_id, user_id, "Concurrent bookmark insert lost the race");
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

pub fn is_bookmarked(conn: &Connection, post_id: &str, user_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM bookmarks WHERE post_id = ?1 AND user_id = ?2)",
        params![post_id, user_id],
        |row| row.get(0),
    )
}
