use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::UserSummary;

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        image: row.get(3)?,
    })
}

pub fn create(
    conn: &Connection,
    username: &str,
    display_name: Option<&str>,
    password_hash: &str,
) -> rusqlite::Result<UserSummary> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO users (id, username, display_name, password_hash) VALUES (?1, ?2, ?3, ?4)",
        params![id, username, display_name, password_hash],
    )?;

    Ok(UserSummary {
        id,
        username: username.to_string(),
        display_name: display_name.map(str::to_string),
        image: None,
    })
}

pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<UserSummary>> {
    conn.query_row(
        "SELECT id, username, display_name, image FROM users WHERE id = ?1",
        params![id],
        map_user,
    )
    .optional()
}

/// The user and stored password hash for a login attempt.
pub fn find_credentials(
    conn: &Connection,
    username: &str,
) -> rusqlite::Result<Option<(UserSummary, Option<String>)>> {
    conn.query_row(
        "SELECT id, username, display_name, image, password_hash FROM users WHERE username = ?1",
        params![username],
        |row| Ok((map_user(row)?, row.get(4)?)),
    )
    .optional()
}
