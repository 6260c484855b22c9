//! Streaming chat-completion providers.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::{ModelProvider, Settings};
use crate::error::{RagError, Result};

mod ollama;
mod openai;

pub use ollama::OllamaChat;
pub use openai::OpenAiChat;

const CHUNK_CHANNEL_CAPACITY: usize = 32;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the model.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
}

/// One message of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message author.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Builds a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Builds a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Optional seed for reproducible sampling.
    pub seed: Option<i64>,
}

impl GenerationOptions {
    /// Reads the LLM sampling settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            temperature: settings.llm_temperature,
            seed: settings.llm_seed,
        }
    }
}

/// Receiving end of a streamed completion. Fragments arrive in order; the
/// channel closes when the upstream stream ends. Dropping the receiver stops
/// the producer at the next fragment.
pub type ChunkStream = mpsc::Receiver<Result<String>>;

/// A chat model reachable over the network.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier.
    fn model(&self) -> &str;

    /// Starts a streamed completion for `messages`.
    ///
    /// Connection and HTTP status failures are returned directly; failures
    /// after streaming has begun arrive as an `Err` item on the stream.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ChunkStream>;
}

/// Builds the chat model selected by `settings.provider`.
pub fn from_settings(settings: &Settings) -> Result<Arc<dyn ChatModel>> {
    let options = GenerationOptions::from_settings(settings);
    let model: Arc<dyn ChatModel> = match settings.provider {
        ModelProvider::Ollama => Arc::new(OllamaChat::new(
            &settings.ollama_base_url,
            &settings.llm_model,
            options,
            settings.http_timeout(),
        )?),
        ModelProvider::OpenAi => Arc::new(OpenAiChat::new(
            settings.openai_api_key.as_deref(),
            &settings.openai_base_url,
            &settings.llm_model,
            options,
            settings.http_timeout(),
        )?),
    };
    Ok(model)
}

/// Outcome of parsing one line of a streamed response body.
#[derive(Debug, PartialEq)]
pub(crate) enum LineEvent {
    Chunk(String),
    Skip,
    Done,
    Failed(String),
}

/// Splits a byte stream into complete lines, keeping partial lines buffered
/// across network reads.
#[derive(Default)]
pub(crate) struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }
        lines
    }

    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

/// Spawns the task that turns a streaming HTTP body into a [`ChunkStream`].
pub(crate) fn pump<F>(resp: reqwest::Response, mut parse: F) -> ChunkStream
where
    F: FnMut(&str) -> LineEvent + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
    let mut body = resp.bytes_stream();
    tokio::spawn(async move {
        let mut splitter = LineSplitter::default();
        while let Some(item) = body.next().await {
            let bytes = match item {
                Ok(bytes) => bytes,
                Err(err) => {
                    let _ = tx.send(Err(RagError::llm(err))).await;
                    return;
                }
            };
            for line in splitter.push(&bytes) {
                if !forward(&tx, parse(&line)).await {
                    return;
                }
            }
        }
        if let Some(line) = splitter.finish() {
            forward(&tx, parse(&line)).await;
        }
    });
    rx
}

// Returns false once the stream should stop.
async fn forward(tx: &mpsc::Sender<Result<String>>, event: LineEvent) -> bool {
    match event {
        LineEvent::Chunk(text) if text.is_empty() => true,
        LineEvent::Chunk(text) => tx.send(Ok(text)).await.is_ok(),
        LineEvent::Skip => true,
        LineEvent::Done => false,
        LineEvent::Failed(message) => {
            let _ = tx.send(Err(RagError::Llm(message))).await;
            false
        }
    }
}

/// Drains a stream into one string; the first error aborts.
#[cfg(test)]
pub(crate) async fn collect_stream(mut stream: ChunkStream) -> Result<String> {
    let mut text = String::new();
    while let Some(chunk) = stream.recv().await {
        text.push_str(&chunk?);
    }
    Ok(text)
}
