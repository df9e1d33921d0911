use async_trait::async_trait;
use serde::Deserialize;

use super::{EnrichmentError, Summarizer};
use crate::config::EnrichmentConfig;

/// Google Generative Language REST client (`models/{model}:generateContent`).
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, api_key: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `None` when no usable API key is configured.
    pub fn from_config(config: &EnrichmentConfig, client: reqwest::Client) -> Option<Self> {
        let api_key = config.usable_api_key()?;
        Some(Self::new(
            client,
            api_key.to_string(),
            config.base_url.clone(),
        ))
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl Summarizer for GeminiClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, EnrichmentError> {
        let failure = |message: String| EnrichmentError::Generation {
            model: model.to_string(),
            message,
        };

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&serde_json::json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            }))
            .send()
            .await
            .map_err(|e| failure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failure(format!("HTTP {status}: {body}")));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| failure(e.to_string()))?;
        let text = parsed.text();
        if text.trim().is_empty() {
            return Err(failure("empty response".to_string()));
        }
        Ok(text)
    }
}
