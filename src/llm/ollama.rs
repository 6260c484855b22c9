use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{pump, ChatMessage, ChatModel, ChunkStream, GenerationOptions, LineEvent};
use crate::error::{RagError, Result};

/// Streaming client for Ollama's `POST /api/chat` (newline-delimited JSON).
pub struct OllamaChat {
    client: Client,
    endpoint: String,
    model: String,
    options: GenerationOptions,
}

impl OllamaChat {
    /// Builds a client for `base_url` (e.g. `http://localhost:11434`).
    pub fn new(
        base_url: &str,
        model: &str,
        options: GenerationOptions,
        timeout: Duration,
    ) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(RagError::Configuration("missing LLM model name".into()));
        }
        // Only bounds connection setup: generation may legitimately run longer.
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|err| {
                RagError::Configuration(format!("failed to build Ollama HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
            model: model.to_string(),
            options,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model(&self) -> &str {
        &self.model
    }

    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ChunkStream> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: true,
            options: RequestOptions {
                temperature: self.options.temperature,
                seed: self.options.seed,
            },
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| RagError::llm(format!("failed to call Ollama chat: {err}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::llm(format!("Ollama returned {status}: {text}")));
        }
        Ok(pump(resp, parse_line))
    }
}

fn parse_line(line: &str) -> LineEvent {
    let parsed: StreamLine = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(err) => return LineEvent::Failed(format!("unreadable Ollama stream line: {err}")),
    };
    if let Some(error) = parsed.error {
        return LineEvent::Failed(error);
    }
    let content = parsed.message.map(|m| m.content).unwrap_or_default();
    match (content.is_empty(), parsed.done) {
        (true, true) => LineEvent::Done,
        (true, false) => LineEvent::Skip,
        (false, _) => LineEvent::Chunk(content),
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: RequestOptions,
}

#[derive(Serialize)]
struct RequestOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StreamLine {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
}
