//! Retrieval-augmented chat shared by the terminal and web front ends.
//!
//! One query runs `Embedding Query -> Searching -> Building Context ->
//! Awaiting Response -> Streaming` and reports its progress as a sequence of
//! [`ChatEvent`]s on a channel. Front ends only render events; every recovery
//! decision (nothing found, apology on upstream failure) is made here.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::embedder::{self, probe_dimension, Embedder};
use crate::error::{RagError, Result};
use crate::llm::{self, ChatModel};
use crate::prompt::{build_messages, sources_table};
use crate::vector_store::{CollectionInfo, QdrantIndex, SearchHit, VectorIndex};

/// Shown when retrieval produced no usable recipe.
pub const NOTHING_FOUND: &str = "I couldn't find any relevant recipes.";

/// Shown when the vector store or the language model failed.
pub const APOLOGY: &str = "Sorry, I encountered an error talking to the AI.";

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Per-deployment retrieval and rendering knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantOptions {
    /// Collection searched for every query.
    pub collection: String,
    /// Hits retrieved per query.
    pub top_k: usize,
    /// Minimum similarity for a hit to be kept.
    pub score_threshold: Option<f32>,
    /// Base URL used in recipe links.
    pub external_url: String,
    /// Append the sources table after each answer.
    pub show_sources: bool,
}

impl AssistantOptions {
    /// Reads the retrieval settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            collection: settings.vectordb_collection_name.clone(),
            top_k: settings.vectordb_k,
            score_threshold: settings.vectordb_score_threshold,
            external_url: settings.mealie_external_url.clone(),
            show_sources: settings.show_sources,
        }
    }
}

/// Stage a query is in; reported so front ends can show progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    /// Embedding the query text.
    EmbeddingQuery,
    /// Running the similarity search.
    Searching,
    /// Assembling context and prompt.
    BuildingContext,
    /// Request sent, waiting for the first fragment.
    AwaitingResponse,
    /// Fragments are arriving.
    Streaming,
}

/// Progress of one query, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Entered a new stage.
    Phase(ChatPhase),
    /// Recipes selected as context, best first.
    Retrieved(Vec<SearchHit>),
    /// Next fragment of the answer.
    Chunk(String),
    /// Fixed user-facing message replacing an answer.
    Notice(String),
    /// Markdown table of the recipes used.
    Sources(String),
}

/// How a query ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    /// Blank query; nothing was called.
    Ignored,
    /// Retrieval produced no hits; the model was not called.
    NothingFound,
    /// An upstream service failed and the apology was shown.
    Failed,
    /// The consumer went away mid-query.
    Cancelled,
    /// The model answered.
    Answered {
        /// Full answer text.
        text: String,
        /// Recipes passed as context.
        hits: Vec<SearchHit>,
    },
}

// The receiving side hung up.
struct Disconnected;

async fn emit(events: &mpsc::Sender<ChatEvent>, event: ChatEvent) -> Result<(), Disconnected> {
    events.send(event).await.map_err(|_| Disconnected)
}

/// Long-lived chat orchestrator. Cheap to clone; clones share the clients.
#[derive(Clone)]
pub struct Assistant {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    llm: Arc<dyn ChatModel>,
    options: Arc<AssistantOptions>,
}

impl Assistant {
    /// Wires the three services together.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn ChatModel>,
        options: AssistantOptions,
    ) -> Self {
        Self {
            embedder,
            index,
            llm,
            options: Arc::new(options),
        }
    }

    /// Builds the configured providers and vector store client.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            embedder::from_settings(settings)?,
            Arc::new(QdrantIndex::from_settings(settings)?),
            llm::from_settings(settings)?,
            AssistantOptions::from_settings(settings),
        ))
    }

    /// Startup check: the collection exists and matches the embedder's
    /// output dimension.
    pub async fn ensure_ready(&self) -> Result<CollectionInfo> {
        let collection = self.options.collection.as_str();
        let info = self.index.collection_info(collection).await?;
        let dimension = probe_dimension(self.embedder.as_ref()).await?;
        if dimension != info.dimension {
            return Err(RagError::DimensionMismatch {
                expected: info.dimension,
                actual: dimension,
            });
        }
        info!(
            collection,
            dimension,
            points = ?info.points,
            model = self.llm.model(),
            "assistant ready"
        );
        Ok(info)
    }

    // An embedding failure or an empty vector means no hits.
    async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        match self.embedder.embed(query).await {
            Ok(vector) if vector.is_empty() => {
                warn!("embedding service returned an empty query vector");
                None
            }
            Ok(vector) => Some(vector),
            Err(err) => {
                warn!(error = %err, "query embedding failed");
                None
            }
        }
    }

    async fn search(&self, vector: &[f32]) -> Result<Vec<SearchHit>> {
        let hits = self
            .index
            .search(
                &self.options.collection,
                vector,
                self.options.top_k,
                self.options.score_threshold,
            )
            .await?;
        debug!(hits = hits.len(), "similarity search done");
        Ok(hits)
    }

    /// Answers one query in the background; events arrive on the returned
    /// receiver, which closes when the query is finished. Dropping it cancels
    /// the query at the next event.
    pub fn respond(&self, query: impl Into<String>) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let assistant = self.clone();
        let query = query.into();
        tokio::spawn(async move {
            let outcome = assistant.drive(&query, &tx).await;
            debug!(?outcome, "query finished");
        });
        rx
    }

    /// Answers one query, reporting progress on `events`.
    pub async fn drive(&self, query: &str, events: &mpsc::Sender<ChatEvent>) -> ChatOutcome {
        let query = query.trim();
        if query.is_empty() {
            return ChatOutcome::Ignored;
        }
        match self.run(query, events).await {
            Ok(outcome) => outcome,
            Err(Disconnected) => {
                info!("chat consumer disconnected; query cancelled");
                ChatOutcome::Cancelled
            }
        }
    }

    async fn run(
        &self,
        query: &str,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<ChatOutcome, Disconnected> {
        emit(events, ChatEvent::Phase(ChatPhase::EmbeddingQuery)).await?;
        let Some(vector) = self.embed_query(query).await else {
            emit(events, ChatEvent::Notice(NOTHING_FOUND.to_string())).await?;
            return Ok(ChatOutcome::NothingFound);
        };

        emit(events, ChatEvent::Phase(ChatPhase::Searching)).await?;
        let hits = match self.search(&vector).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!(error = %err, "vector search failed");
                emit(events, ChatEvent::Notice(APOLOGY.to_string())).await?;
                return Ok(ChatOutcome::Failed);
            }
        };
        emit(events, ChatEvent::Retrieved(hits.clone())).await?;
        if hits.is_empty() {
            emit(events, ChatEvent::Notice(NOTHING_FOUND.to_string())).await?;
            return Ok(ChatOutcome::NothingFound);
        }

        emit(events, ChatEvent::Phase(ChatPhase::BuildingContext)).await?;
        let messages = build_messages(query, &hits, &self.options.external_url);

        emit(events, ChatEvent::Phase(ChatPhase::AwaitingResponse)).await?;
        let mut stream = match self.llm.stream_chat(&messages).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "llm request failed");
                emit(events, ChatEvent::Notice(APOLOGY.to_string())).await?;
                return Ok(ChatOutcome::Failed);
            }
        };

        emit(events, ChatEvent::Phase(ChatPhase::Streaming)).await?;
        let mut text = String::new();
        while let Some(chunk) = stream.recv().await {
            match chunk {
                Ok(chunk) => {
                    text.push_str(&chunk);
                    emit(events, ChatEvent::Chunk(chunk)).await?;
                }
                Err(err) => {
                    warn!(error = %err, "llm stream failed");
                    emit(events, ChatEvent::Notice(APOLOGY.to_string())).await?;
                    return Ok(ChatOutcome::Failed);
                }
            }
        }

        if self.options.show_sources {
            emit(events, ChatEvent::Sources(sources_table(&hits))).await?;
        }
        Ok(ChatOutcome::Answered { text, hits })
    }
}
