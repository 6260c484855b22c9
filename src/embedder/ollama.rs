//! Ollama embedding client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::Embedder;
use crate::error::{RagError, Result};

/// Embeddings client for a local Ollama server (`POST /api/embed`).
#[derive(Clone)]
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaEmbedder {
    /// Builds a new client for `base_url` (e.g. `http://localhost:11434`).
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(RagError::Configuration("missing embedding model name".into()));
        }
        let parsed = Url::parse(base_url)
            .map_err(|err| RagError::Configuration(format!("invalid Ollama base URL: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RagError::Configuration(
                "Ollama base URL must be an http(s) URL".into(),
            ));
        }
        let client = Client::builder().timeout(timeout).build().map_err(|err| {
            RagError::Configuration(format!("failed to build Ollama HTTP client: {err}"))
        })?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/embed", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: &self.model,
            input: text,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(RagError::embedding)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::embedding(format!(
                "Ollama embed request failed ({status}): {body}"
            )));
        }
        let parsed: EmbedResponse = resp.json().await.map_err(|err| {
            RagError::embedding(format!("failed to parse Ollama embed response: {err}"))
        })?;
        parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("Ollama response missing embeddings"))
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}
