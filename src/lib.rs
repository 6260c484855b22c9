#![warn(missing_docs)]
//! Retrieval-augmented recipe assistant over a Mealie instance: fetch recipes,
//! embed them into a Qdrant collection and answer questions through a
//! streaming chat model.

pub mod chat;
pub mod config;
pub mod embedder;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod mealie;
pub mod prompt;
pub mod recipe;
pub mod telemetry;
pub mod terminal;
pub mod vector_store;
pub mod web;

#[cfg(test)]
mod testing;

pub use chat::{Assistant, AssistantOptions, ChatEvent, ChatOutcome, ChatPhase};
pub use config::{ModelProvider, Settings};
pub use embedder::Embedder;
pub use error::{RagError, Result};
pub use ingest::{IngestReport, Ingestor};
pub use llm::{ChatMessage, ChatModel, Role};
pub use mealie::{MealieClient, RecipeSource};
pub use recipe::Recipe;
pub use vector_store::{QdrantIndex, SearchHit, VectorIndex};
