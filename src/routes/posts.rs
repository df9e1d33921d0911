use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::models::{join_labels, CommentView, PostView};
use crate::db::posts::{self, NewPost, PostUpdate};
use crate::db::{bookmarks, comments, jobs};
use crate::db::jobs::EnrichmentJob;
use crate::enrichment::{self, EnrichmentError};
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, CurrentUser, MaybeUser};
use crate::feed::{FeedParams, FeedQuery};
use crate::metadata;
use crate::state::AppState;

// --- Request / response types ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub url: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// `tags` and `categories` arrive either comma-joined or as a list.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Labels {
    Joined(String),
    List(Vec<String>),
}

impl Labels {
    fn into_column(self) -> String {
        match self {
            Labels::Joined(joined) => join_labels(&joined.split(',').collect::<Vec<_>>()),
            Labels::List(list) => join_labels(&list),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Labels>,
    pub categories: Option<Labels>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewCountResponse {
    pub view_count: i64,
}

#[derive(Serialize)]
pub struct BookmarkResponse {
    pub bookmarked: bool,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route(
            "/api/posts/{id}",
            get(get_post).patch(update_post).delete(delete_post),
        )
        .route("/api/posts/{id}/view", post(record_view))
        .route("/api/posts/{id}/bookmark", post(toggle_bookmark))
        .route("/api/posts/{id}/comments", get(list_comments))
        .route(
            "/api/posts/{id}/analyze",
            get(analysis_status).post(analyze_post),
        )
        .route("/api/bookmarks", get(list_bookmarks))
}

/// Submitted links must be absolute http(s) URLs.
fn validate_url(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    let parsed = url::Url::parse(trimmed)
        .map_err(|_| AppError::BadRequest("Invalid URL".into()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        _ => Err(AppError::BadRequest("URL must use http or https".into())),
    }
}

/// 404 when the post is gone, 403 when it belongs to someone else.
fn require_owner(state: &AppState, post_id: &str, user: &CurrentUser) -> AppResult<()> {
    let conn = state.db.get()?;
    let post = posts::get(&conn, post_id)?.ok_or(AppError::NotFound)?;
    if post.user_id != user.id {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

fn require_post(state: &AppState, post_id: &str) -> AppResult<()> {
    let conn = state.db.get()?;
    if !posts::exists(&conn, post_id)? {
        return Err(AppError::NotFound);
    }
    Ok(())
}

// --- Handlers ---

async fn list_posts(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(params): Query<FeedParams>,
) -> AppResult<Json<Vec<PostView>>> {
    let query = FeedQuery::build(&params, viewer.id(), Utc::now(), &state.config.feed);
    let conn = state.db.get()?;
    Ok(Json(posts::list_feed(&conn, &query, viewer.id())?))
}

async fn list_bookmarks(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<FeedParams>,
) -> AppResult<Json<Vec<PostView>>> {
    let query = FeedQuery::build(&params, Some(&user.id), Utc::now(), &state.config.feed)
        .bookmarked_by(&user.id);
    let conn = state.db.get()?;
    Ok(Json(posts::list_feed(&conn, &query, Some(&user.id))?))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CreatePostRequest>,
) -> AppResult<Response> {
    let url = validate_url(&req.url)?;

    // No connection is held across the fetch.
    let page = metadata::ingest(&state.http, &url).await;

    let tags = join_labels(&page.tags);
    let categories = join_labels(&req.categories);

    let view = {
        let conn = state.db.get()?;
        let post = posts::insert(
            &conn,
            &NewPost {
                user_id: &user.id,
                url: &url,
                title: &page.title,
                description: &page.description,
                og_image: &page.og_image,
                tags: &tags,
                categories: &categories,
                created_at: Utc::now(),
            },
        )?;
        posts::view(&conn, &post.id, Some(&user.id))?
            .ok_or_else(|| AppError::Internal("Created post vanished".into()))?
    };

    tracing::info!(post_id = %view.id, user_id = %user.id, url = %url, "Post created");

    if let Err(e) = enrichment::schedule(&state, &view.id) {
        tracing::error!(post_id = %view.id, error = %e, "Could not schedule enrichment");
    }

    Ok((StatusCode::CREATED, Json(view)).into_response())
}

async fn get_post(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<PostView>> {
    let conn = state.db.get()?;
    let view = posts::view(&conn, &id, viewer.id())?.ok_or(AppError::NotFound)?;
    Ok(Json(view))
}

async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdatePostRequest>,
) -> AppResult<Json<PostView>> {
    require_owner(&state, &id, &user)?;

    if let Some(title) = req.title.as_deref() {
        if title.trim().is_empty() {
            return Err(AppError::BadRequest("Title cannot be empty".into()));
        }
    }

    let changes = PostUpdate {
        title: req.title.map(|t| t.trim().to_string()),
        description: req.description,
        tags: req.tags.map(Labels::into_column),
        categories: req.categories.map(Labels::into_column),
    };

    let conn = state.db.get()?;
    if !posts::update(&conn, &id, &changes)? {
        return Err(AppError::NotFound);
    }
    let view = posts::view(&conn, &id, Some(&user.id))?.ok_or(AppError::NotFound)?;
    Ok(Json(view))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    require_owner(&state, &id, &user)?;

    let conn = state.db.get()?;
    if !posts::delete(&conn, &id)? {
        return Err(AppError::NotFound);
    }
    tracing::info!(post_id = %id, user_id = %user.id, "Post deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn record_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ViewCountResponse>> {
    let conn = state.db.get()?;
    let view_count = posts::increment_views(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(ViewCountResponse { view_count }))
}

async fn toggle_bookmark(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<BookmarkResponse>> {
    require_post(&state, &id)?;

    let conn = state.db.get()?;
    let bookmarked = bookmarks::toggle(&conn, &id, &user.id)?;
    Ok(Json(BookmarkResponse { bookmarked }))
}

async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<CommentView>>> {
    require_post(&state, &id)?;

    let conn = state.db.get()?;
    Ok(Json(comments::list_for_post(&conn, &id)?))
}

async fn analyze_post(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<EnrichmentJob>> {
    match enrichment::analyze(&state, &id).await {
        Ok(job) => Ok(Json(job)),
        Err(EnrichmentError::PostNotFound(_)) => Err(AppError::NotFound),
        Err(e) => Err(AppError::Internal(e.to_string())),
    }
}

async fn analysis_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<EnrichmentJob>> {
    let conn = state.db.get()?;
    let job = jobs::get(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(job))
}
