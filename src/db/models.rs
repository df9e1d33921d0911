use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Storage format for timestamps. Same shape as SQLite's
/// `strftime('%Y-%m-%dT%H:%M:%fZ')`, so string order is time order.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

/// Split a comma-joined `tags`/`categories` column.
pub fn split_labels(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn join_labels<S: AsRef<str>>(labels: &[S]) -> String {
    labels
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Union of stored labels and new ones; stored order first, duplicates
/// dropped.
pub fn merge_labels(existing: &str, new: &[String]) -> Vec<String> {
    let mut merged = split_labels(existing);
    for label in new {
        if !merged.contains(label) {
            merged.push(label.clone());
        }
    }
    merged
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub image: Option<String>,
}

/// A `posts` row as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub og_image: String,
    pub tags: String,
    pub categories: String,
    pub ai_summary: Option<String>,
    pub view_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A post as returned by the API, with aggregates and the viewer's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub og_image: String,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub ai_summary: Option<String>,
    pub view_count: i64,
    pub created_at: String,
    pub updated_at: String,
    pub user: UserSummary,
    pub comment_count: i64,
    pub reaction_count: i64,
    pub bookmarked: bool,
    pub viewer_reaction: Option<ReactionType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReactionType {
    ThumbsUp,
    Fire,
    Idea,
    Laugh,
}

impl ReactionType {
    pub const ALL: [ReactionType; 4] = [
        ReactionType::ThumbsUp,
        ReactionType::Fire,
        ReactionType::Idea,
        ReactionType::Laugh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionType::ThumbsUp => "THUMBS_UP",
            ReactionType::Fire => "FIRE",
            ReactionType::Idea => "IDEA",
            ReactionType::Laugh => "LAUGH",
        }
    }
}

impl fmt::Display for ReactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown reaction type: {0}")]
pub struct UnknownReactionType(pub String);

impl FromStr for ReactionType {
    type Err = UnknownReactionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReactionType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownReactionType(s.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: ReactionType,
    pub created_at: String,
}
