//! AI enrichment: summary and extra tags for a post.
//!
//! Runs as a detached task after post creation, or inline from the analyze
//! endpoint. Progress lives in the post's `enrichment_jobs` row; failures
//! end up there and never fail the request that triggered the work.

pub mod gemini;

use async_trait::async_trait;

use crate::db::jobs::{self, EnrichmentJob, JobStatus};
use crate::db::models::Post;
use crate::db::{self, posts};
use crate::metadata::{self, FetchError};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("post {0} not found")]
    PostNotFound(String),

    #[error("page fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("model {model} failed: {message}")]
    Generation { model: String, message: String },

    #[error("no models configured")]
    NoModels,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

/// A text-generation backend.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, EnrichmentError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Analysis {
    pub summary: String,
    pub tags: Vec<String>,
}

pub fn build_prompt(title: &str, description: &str, text: &str) -> String {
    format!(
        "Analyze the following web page.\n\n\
         Title: {title}\n\
         Description: {description}\n\
         Content: {text}\n\n\
         Respond in exactly this format:\n\
         SUMMARY: [a 3-4 sentence summary of the key points]\n\
         TAGS: [3-5 related keywords separated by commas, e.g. React,TypeScript,Web]"
    )
}

/// Read `SUMMARY:` and `TAGS:` sections out of a model reply. Missing
/// sections come back empty.
pub fn parse_response(reply: &str) -> Analysis {
    const SUMMARY: &str = "SUMMARY:";
    const TAGS: &str = "TAGS:";

    let tags_at = reply.find(TAGS);

    let summary = reply
        .find(SUMMARY)
        .map(|at| at + SUMMARY.len())
        .map(|start| {
            let end = tags_at.filter(|&t| t >= start).unwrap_or(reply.len());
            reply[start..end].trim().to_string()
        })
        .unwrap_or_default();

    let tags = tags_at
        .map(|at| &reply[at + TAGS.len()..])
        .map(|section| {
            section
                .trim()
                .trim_matches(|c| c == '[' || c == ']')
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Analysis { summary, tags }
}

/// Try each model in order until one answers. Returns the model used and
/// its reply, or the last error when every model fails.
pub async fn generate_with_fallback(
    summarizer: &dyn Summarizer,
    models: &[String],
    prompt: &str,
) -> Result<(String, String), EnrichmentError> {
    let mut last_error = EnrichmentError::NoModels;

    for model in models {
        match summarizer.generate(model, prompt).await {
            Ok(reply) => {
                tracing::info!(model = %model, "Enrichment generated");
                return Ok((model.clone(), reply));
            }
            Err(e) => {
                tracing::warn!(model = %model, error = %e, "Model failed, trying next");
                last_error = e;
            }
        }
    }

    Err(last_error)
}

/// Queue enrichment for a freshly created post without waiting for it.
pub fn schedule(state: &AppState, post_id: &str) -> Result<(), EnrichmentError> {
    if !state.config.enrichment.auto_enrich {
        return Ok(());
    }

    let conn = state.db.get()?;
    if state.summarizer.is_none() {
        jobs::mark(&conn, post_id, JobStatus::Skipped, None, None)?;
        return Ok(());
    }
    jobs::mark(&conn, post_id, JobStatus::Pending, None, None)?;
    drop(conn);

    let state = state.clone();
    let post_id = post_id.to_string();
    tokio::spawn(async move {
        match analyze(&state, &post_id).await {
            Ok(_) => {}
            Err(EnrichmentError::PostNotFound(_)) => {
                tracing::info!(post_id = %post_id, "Post gone before enrichment finished");
            }
            Err(e) => {
                tracing::error!(post_id = %post_id, error = %e, "Background enrichment failed");
            }
        }
    });

    Ok(())
}

/// Run enrichment for one post and record the outcome in its job row.
///
/// Errors are returned only for a missing post or a storage failure;
/// fetch and generation failures produce a `failed` job.
pub async fn analyze(state: &AppState, post_id: &str) -> Result<EnrichmentJob, EnrichmentError> {
    let post = {
        let conn = state.db.get()?;
        posts::get(&conn, post_id)?.ok_or_else(|| EnrichmentError::PostNotFound(post_id.to_string()))?
    };

    let Some(summarizer) = state.summarizer.clone() else {
        let conn = state.db.get()?;
        return job_row(post_id, jobs::mark(&conn, post_id, JobStatus::Skipped, None, None));
    };

    {
        let conn = state.db.get()?;
        job_row(post_id, jobs::mark(&conn, post_id, JobStatus::Pending, None, None))?;
    }

    let outcome = run(state, summarizer.as_ref(), &post).await;

    let mut conn = state.db.get()?;
    match outcome {
        Ok((model, analysis)) => {
            let applied = posts::apply_enrichment(
                &mut conn,
                post_id,
                Some(analysis.summary.as_str()),
                &analysis.tags,
            )?;
            if !applied {
                tracing::info!(post_id, "Post deleted during enrichment");
                return Err(EnrichmentError::PostNotFound(post_id.to_string()));
            }
            tracing::info!(post_id, model = %model, tags = analysis.tags.len(), "Post enriched");
            job_row(post_id, jobs::mark(&conn, post_id, JobStatus::Done, Some(&model), None))
        }
        Err(e) => {
            tracing::warn!(post_id, error = %e, "Enrichment failed");
            let message = e.to_string();
            job_row(post_id, jobs::mark(&conn, post_id, JobStatus::Failed, None, Some(&message)))
        }
    }
}

/// A job row references its post, so a failed write after the post was
/// deleted means the post is gone rather than a storage fault.
fn job_row(
    post_id: &str,
    written: rusqlite::Result<EnrichmentJob>,
) -> Result<EnrichmentJob, EnrichmentError> {
    written.map_err(|e| {
        if db::is_constraint_violation(&e) {
            EnrichmentError::PostNotFound(post_id.to_string())
        } else {
            EnrichmentError::Database(e)
        }
    })
}

async fn run(
    state: &AppState,
    summarizer: &dyn Summarizer,
    post: &Post,
) -> Result<(String, Analysis), EnrichmentError> {
    let config = &state.config.enrichment;

    let html = metadata::fetch_html(&state.http, &post.url).await?;
    let text = metadata::visible_text(&html, config.max_text_chars);
    let prompt = build_prompt(&post.title, &post.description, &text);

    let (model, reply) = generate_with_fallback(summarizer, &config.models, &prompt).await?;
    Ok((model, parse_response(&reply)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails for every model listed in `failing`, echoes a canned reply
    /// otherwise, and records the call order.
    struct ScriptedSummarizer {
        failing: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Summarizer for ScriptedSummarizer {
        async fn generate(&self, model: &str, _prompt: &str) -> Result<String, EnrichmentError> {
            self.calls.lock().unwrap().push(model.to_string());
            if self.failing.contains(&model) {
                return Err(EnrichmentError::Generation {
                    model: model.to_string(),
                    message: "quota exceeded".to_string(),
                });
            }
            Ok(format!("SUMMARY: from {model}\nTAGS: a,b"))
        }
    }

    fn models() -> Vec<String> {
        vec!["m1".into(), "m2".into(), "m3".into()]
    }

    #[test]
    fn parse_response_reads_both_sections() {
        let reply = "SUMMARY: Rust is fast.\nIt is also safe.\nTAGS: Rust, Systems ,Memory Safety";
        let analysis = parse_response(reply);
        assert_eq!(analysis.summary, "Rust is fast.\nIt is also safe.");
        assert_eq!(analysis.tags, vec!["Rust", "Systems", "Memory Safety"]);
    }

    #[test]
    fn parse_response_tolerates_brackets_and_missing_parts() {
        let analysis = parse_response("TAGS: [a, b]");
        assert_eq!(analysis.summary, "");
        assert_eq!(analysis.tags, vec!["a", "b"]);

        let analysis = parse_response("SUMMARY: only a summary");
        assert_eq!(analysis.summary, "only a summary");
        assert!(analysis.tags.is_empty());

        assert_eq!(parse_response("no structure at all"), Analysis::default());
    }

    #[test]
    fn prompt_carries_page_fields() {
        let prompt = build_prompt("T", "D", "Body text");
        assert!(prompt.contains("Title: T"));
        assert!(prompt.contains("Description: D"));
        assert!(prompt.contains("Content: Body text"));
        assert!(prompt.contains("SUMMARY:"));
        assert!(prompt.contains("TAGS:"));
    }

    #[tokio::test]
    async fn fallback_advances_past_failing_models() {
        let summarizer = ScriptedSummarizer {
            failing: vec!["m1"],
            calls: Mutex::new(Vec::new()),
        };
        let (model, reply) = generate_with_fallback(&summarizer, &models(), "p")
            .await
            .unwrap();
        assert_eq!(model, "m2");
        assert!(reply.contains("from m2"));
        assert_eq!(*summarizer.calls.lock().unwrap(), vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn fallback_fails_only_when_all_models_fail() {
        let summarizer = ScriptedSummarizer {
            failing: vec!["m1", "m2", "m3"],
            calls: Mutex::new(Vec::new()),
        };
        let err = generate_with_fallback(&summarizer, &models(), "p")
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::Generation { ref model, .. } if model == "m3"));
        assert_eq!(summarizer.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn empty_model_list_is_an_error() {
        let summarizer = ScriptedSummarizer {
            failing: vec![],
            calls: Mutex::new(Vec::new()),
        };
        let err = generate_with_fallback(&summarizer, &[], "p").await.unwrap_err();
        assert!(matches!(err, EnrichmentError::NoModels));
    }
}
