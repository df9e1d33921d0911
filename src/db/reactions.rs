use rusqlite::{params, Connection};

use crate::db::models::{now_timestamp, Reaction, ReactionType};

/// Set the user's reaction on a post. One row per (post, user): a different
/// type replaces the previous one, the same type rewrites it unchanged.
pub fn react(
    conn: &Connection,
    post_id: &str,
    user_id: &str,
    kind: ReactionType,
) -> rusqlite::Result<Reaction> {
    let id = uuid::Uuid::now_v7().to_string();

    conn.query_row(
        "INSERT INTO reactions (id, post_id, user_id, type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(post_id, user_id) DO UPDATE SET type = excluded.type
         RETURNING id, post_id, user_id, type, created_at",
        params![id, post_id, user_id, kind.as_str(), now_timestamp()],
        |row| {
            let stored: String = row.get(3)?;
            Ok(Reaction {
                id: row.get(0)?,
                post_id: row.get(1)?,
                user_id: row.get(2)?,
                kind: stored.parse().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
                created_at: row.get(4)?,
            })
        },
    )
}

pub fn count_for_post(conn: &Connection, post_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM reactions WHERE post_id = ?1",
        params![post_id],
        |row| row.get(0),
    )
}
