//! Error taxonomy shared by the ingestion pipeline and the chat front ends.

use thiserror::Error;

/// Failures surfaced by recipe fetching, embedding, indexing and generation.
///
/// Variants fall into three groups: configuration problems that abort startup
/// or ingestion, upstream service failures that the chat loop recovers from,
/// and lookup misses reported back to the caller as "not found".
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid or inconsistent settings.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The target collection is already present and recreation was not requested.
    #[error("collection '{0}' already exists; set DELETE_COLLECTION_IF_EXISTS to recreate it")]
    CollectionExists(String),
    /// The collection queried by the chat front ends has not been ingested yet.
    #[error("collection '{0}' not found; did you run `mealierag ingest`?")]
    CollectionMissing(String),
    /// Embedding length disagrees with the collection dimension.
    #[error("embedding dimension mismatch: collection expects {expected}, model produced {actual}")]
    DimensionMismatch {
        /// Dimension the collection was created with (or the probe dimension).
        expected: usize,
        /// Dimension actually produced.
        actual: usize,
    },
    /// The embedding service failed or answered with an unusable payload.
    #[error("embedding service error: {0}")]
    Embedding(String),
    /// The vector store failed.
    #[error("vector store error: {0}")]
    VectorStore(String),
    /// The language model failed before or during streaming.
    #[error("llm service error: {0}")]
    Llm(String),
    /// The recipe manager API failed.
    #[error("recipe service error: {0}")]
    RecipeSource(String),
    /// A recipe lookup missed.
    #[error("recipe '{0}' not found")]
    NotFound(String),
}

impl RagError {
    /// Fatal errors that must abort startup or ingestion without retry.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::CollectionExists(_)
                | Self::CollectionMissing(_)
                | Self::DimensionMismatch { .. }
        )
    }

    /// Failures of one of the remote services the system depends on.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Embedding(_) | Self::VectorStore(_) | Self::Llm(_) | Self::RecipeSource(_)
        )
    }

    pub(crate) fn embedding(err: impl std::fmt::Display) -> Self {
        Self::Embedding(err.to_string())
    }

    pub(crate) fn vector_store(err: impl std::fmt::Display) -> Self {
        Self::VectorStore(err.to_string())
    }

    pub(crate) fn llm(err: impl std::fmt::Display) -> Self {
        Self::Llm(err.to_string())
    }

    pub(crate) fn recipe_source(err: impl std::fmt::Display) -> Self {
        Self::RecipeSource(err.to_string())
    }
}

/// Convenience alias used across the library.
pub type Result<T, E = RagError> = std::result::Result<T, E>;
