use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::models::{Reaction, ReactionType};
use crate::db::{posts, reactions};
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, CurrentUser};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactRequest {
    pub post_id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactResponse {
    pub reaction: Reaction,
    pub reaction_count: i64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/reactions", post(react))
}

/// One reaction per user per post; a new type replaces the old one.
async fn react(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<ReactRequest>,
) -> AppResult<Json<ReactResponse>> {
    let kind = req
        .kind
        .trim()
        .parse::<ReactionType>()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let conn = state.db.get()?;
    if !posts::exists(&conn, &req.post_id)? {
        return Err(AppError::NotFound);
    }

    let reaction = reactions::react(&conn, &req.post_id, &user.id, kind)?;
    let reaction_count = reactions::count_for_post(&conn, &req.post_id)?;

    tracing::debug!(post_id = %req.post_id, user_id = %user.id, kind = %kind, "Reaction set");
    Ok(Json(ReactResponse {
        reaction,
        reaction_count,
    }))
}
