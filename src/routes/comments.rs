use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{patch, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::Comment;
use crate::db::{comments, posts};
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, CurrentUser};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub post_id: String,
    pub content: String,
}

#[derive(Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/comments", post(create_comment))
        .route(
            "/api/comments/{id}",
            patch(update_comment).delete(delete_comment),
        )
}

fn clean_content(raw: &str) -> AppResult<&str> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Comment cannot be empty".into()));
    }
    Ok(content)
}

fn require_author(conn: &rusqlite::Connection, id: &str, user: &CurrentUser) -> AppResult<Comment> {
    let comment = comments::get(conn, id)?.ok_or(AppError::NotFound)?;
    if comment.user_id != user.id {
        return Err(AppError::Forbidden);
    }
    Ok(comment)
}

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CreateCommentRequest>,
) -> AppResult<Response> {
    let content = clean_content(&req.content)?;

    let conn = state.db.get()?;
    if !posts::exists(&conn, &req.post_id)? {
        return Err(AppError::NotFound);
    }

    let comment = comments::insert(&conn, &req.post_id, &user.id, content)?;
    Ok((StatusCode::CREATED, Json(comment)).into_response())
}

async fn update_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateCommentRequest>,
) -> AppResult<Json<Comment>> {
    let conn = state.db.get()?;
    require_author(&conn, &id, &user)?;
    let content = clean_content(&req.content)?;

    let updated = comments::update_content(&conn, &id, content)?.ok_or(AppError::NotFound)?;
    Ok(Json(updated))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    require_author(&conn, &id, &user)?;

    if !comments::delete(&conn, &id)? {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}
