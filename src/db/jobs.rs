use std::fmt;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::models::now_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Done,
    Failed,
    /// No generation client configured.
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(JobStatus::Pending),
            "done" => Some(JobStatus::Done),
            "failed" => Some(JobStatus::Failed),
            "skipped" => Some(JobStatus::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentJob {
    pub post_id: String,
    pub status: JobStatus,
    pub model: Option<String>,
    pub error: Option<String>,
    pub updated_at: String,
}

/// Upsert the job row for a post.
pub fn mark(
    conn: &Connection,
    post_id: &str,
    status: JobStatus,
    model: Option<&str>,
    error: Option<&str>,
) -> rusqlite::Result<EnrichmentJob> {
    let updated_at = now_timestamp();
    conn.execute(
        "INSERT INTO enrichment_jobs (post_id, status, model, error, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(post_id) DO UPDATE SET
           status = excluded.status,
           model = excluded.model,
           error = excluded.error,
           updated_at = excluded.updated_at",
        params![post_id, status.as_str(), model, error, updated_at],
    )?;

    Ok(EnrichmentJob {
        post_id: post_id.to_string(),
        status,
        model: model.map(str::to_string),
        error: error.map(str::to_string),
        updated_at,
    })
}

pub fn get(conn: &Connection, post_id: &str) -> rusqlite::Result<Option<EnrichmentJob>> {
    conn.query_row(
        "SELECT post_id, status, model, error, updated_at FROM enrichment_jobs WHERE post_id = ?1",
        params![post_id],
        |row| {
            let status: String = row.get(1)?;
            Ok(EnrichmentJob {
                post_id: row.get(0)?,
                status: JobStatus::parse(&status).unwrap_or(JobStatus::Failed),
                model: row.get(2)?,
                error: row.get(3)?,
                updated_at: row.get(4)?,
            })
        },
    )
    .optional()
}
