use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::enrichment::gemini::GeminiClient;
use crate::enrichment::Summarizer;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    /// Shared client for page fetches and generation calls.
    pub http: reqwest::Client,
    /// `None` when no usable API key is configured; enrichment is skipped.
    pub summarizer: Option<Arc<dyn Summarizer>>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.fetch.user_agent.clone())
            .timeout(Duration::from_secs(config.fetch.timeout_secs))
            .build()?;

        let summarizer = GeminiClient::from_config(&config.enrichment, http.clone())
            .map(|client| Arc::new(client) as Arc<dyn Summarizer>);

        if summarizer.is_none() {
            tracing::info!("No generation API key configured; enrichment disabled");
        }

        Ok(Self {
            db,
            config,
            http,
            summarizer,
        })
    }

    /// Replace the generation client, e.g. with a fake in tests.
    pub fn with_summarizer(mut self, summarizer: Option<Arc<dyn Summarizer>>) -> Self {
        self.summarizer = summarizer;
        self
    }
}
