//! Text embedding clients.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ModelProvider, Settings};
use crate::error::Result;

pub mod ollama;
pub mod openai;

pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

/// Fixed input used to discover the output dimension of the configured model.
pub const PROBE_TEXT: &str = "test";

/// Converts text into a fixed-length vector through a remote embedding service.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier sent with every request.
    fn model(&self) -> &str;

    /// Embeds one text. Callers should not pass empty text; the resulting
    /// vector is whatever the service returns for it.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embeds [`PROBE_TEXT`] and returns the vector length.
pub async fn probe_dimension(embedder: &dyn Embedder) -> Result<usize> {
    let probe = embedder.embed(PROBE_TEXT).await?;
    if probe.is_empty() {
        return Err(crate::RagError::Configuration(format!(
            "embedding model '{}' returned an empty probe vector",
            embedder.model()
        )));
    }
    Ok(probe.len())
}

/// Builds the embedder selected by `settings.provider`.
pub fn from_settings(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match settings.provider {
        ModelProvider::Ollama => Arc::new(OllamaEmbedder::new(
            &settings.ollama_base_url,
            &settings.embedding_model,
            settings.http_timeout(),
        )?),
        ModelProvider::OpenAi => Arc::new(OpenAiEmbedder::new(
            settings.openai_api_key.as_deref(),
            &settings.openai_base_url,
            &settings.embedding_model,
            settings.embedding_dimensions,
            settings.http_timeout(),
        )?),
    };
    Ok(embedder)
}
