use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{now_timestamp, Comment, CommentView, UserSummary};

fn map_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn map_comment_view(row: &Row<'_>) -> rusqlite::Result<CommentView> {
    Ok(CommentView {
        comment: map_comment(row)?,
        user: UserSummary {
            id: row.get(6)?,
            username: row.get(7)?,
            display_name: row.get(8)?,
            image: row.get(9)?,
        },
    })
}

const VIEW_SELECT: &str = "SELECT c.id, c.post_id, c.user_id, c.content, c.created_at, c.updated_at,
        u.id, u.username, u.display_name, u.image
     FROM comments c
     JOIN users u ON u.id = c.user_id";

pub fn insert(
    conn: &Connection,
    post_id: &str,
    user_id: &str,
    content: &str,
) -> rusqlite::Result<CommentView> {
    let id = uuid::Uuid::now_v7().to_string();
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO comments (id, post_id, user_id, content, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![id, post_id, user_id, content, now],
    )?;

    conn.query_row(
        &format!("{VIEW_SELECT} WHERE c.id = ?1"),
        params![id],
        map_comment_view,
    )
}

pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<Comment>> {
    conn.query_row(
        "SELECT id, post_id, user_id, content, created_at, updated_at FROM comments WHERE id = ?1",
        params![id],
        map_comment,
    )
    .optional()
}

pub fn update_content(conn: &Connection, id: &str, content: &str) -> rusqlite::Result<Option<Comment>> {
    conn.query_row(
        "UPDATE comments SET content = ?2, updated_at = ?3 WHERE id = ?1
         RETURNING id, post_id, user_id, content, created_at, updated_at",
        params![id, content, now_timestamp()],
        map_comment,
    )
    .optional()
}

pub fn delete(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let rows = conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

/// Newest first.
pub fn list_for_post(conn: &Connection, post_id: &str) -> rusqlite::Result<Vec<CommentView>> {
    let mut stmt = conn.prepare(&format!(
        "{VIEW_SELECT} WHERE c.post_id = ?1 ORDER BY c.created_at DESC, c.id DESC"
    ))?;
    let comments = stmt
        .query_map(params![post_id], map_comment_view)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}
