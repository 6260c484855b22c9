use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{pump, ChatMessage, ChatModel, ChunkStream, GenerationOptions, LineEvent};
use crate::error::{RagError, Result};

/// Streaming client for OpenAI-compatible `POST /chat/completions` (server-sent events).
pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    model: String,
    options: GenerationOptions,
}

impl OpenAiChat {
    /// Builds a client; `api_key` may be omitted for local servers.
    pub fn new(
        api_key: Option<&str>,
        base_url: &str,
        model: &str,
        options: GenerationOptions,
        timeout: Duration,
    ) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(RagError::Configuration("missing LLM model name".into()));
        }
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.map(str::trim).filter(|key| !key.is_empty()) {
            let auth = format!("Bearer {key}");
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth)
                    .map_err(|_| RagError::Configuration("invalid OpenAI API key".into()))?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .connect_timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| {
                RagError::Configuration(format!("failed to build OpenAI HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            options,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model(&self) -> &str {
        &self.model
    }

    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ChunkStream> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.options.temperature,
            seed: self.options.seed,
            stream: true,
            messages,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| RagError::llm(format!("failed to call OpenAI chat completions: {err}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::llm(format!("OpenAI returned {status}: {text}")));
        }
        Ok(pump(resp, parse_line))
    }
}

fn parse_line(line: &str) -> LineEvent {
    let Some(data) = line.strip_prefix("data:") else {
        // SSE comments, `event:` and `id:` fields carry no content.
        return LineEvent::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return LineEvent::Done;
    }
    let parsed: StreamChunk = match serde_json::from_str(data) {
        Ok(parsed) => parsed,
        Err(err) => return LineEvent::Failed(format!("unreadable OpenAI stream chunk: {err}")),
    };
    if let Some(error) = parsed.error {
        return LineEvent::Failed(error.message);
    }
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .map(LineEvent::Chunk)
        .unwrap_or(LineEvent::Skip)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    stream: bool,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}
