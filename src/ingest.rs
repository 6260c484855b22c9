//! One-shot ingestion: fetch recipes, embed them and load the vector index.
//!
//! The whole collection is materialized in memory before anything is written.
//! That is fine for a personal recipe collection and is not meant for
//! unbounded corpora. Any failure aborts the run; nothing is resumable.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::embedder::{probe_dimension, Embedder};
use crate::error::{RagError, Result};
use crate::mealie::RecipeSource;
use crate::recipe::Recipe;
use crate::vector_store::{Distance, IndexedPoint, PointId, RecipePayload, VectorIndex};

/// Summary of a successful ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Points written to the collection.
    pub indexed: usize,
    /// Vector dimension of the collection.
    pub dimension: usize,
    /// Whether an existing collection was dropped first.
    pub recreated: bool,
}

/// Orchestrates fetcher, embedder and index for a full reload.
pub struct Ingestor {
    source: Arc<dyn RecipeSource>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    collection: String,
    recreate: bool,
}

impl Ingestor {
    /// Wires the pipeline. `recreate` allows dropping an existing collection.
    pub fn new(
        source: Arc<dyn RecipeSource>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        collection: impl Into<String>,
        recreate: bool,
    ) -> Self {
        Self {
            source,
            embedder,
            index,
            collection: collection.into(),
            recreate,
        }
    }

    /// Runs the pipeline end to end.
    ///
    /// Every recipe is embedded before the index is touched, so a failed run
    /// leaves an existing collection as it was.
    pub async fn run(&self) -> Result<IngestReport> {
        let name = self.collection.as_str();
        let exists = self.index.collection_exists(name).await?;
        if exists && !self.recreate {
            return Err(RagError::CollectionExists(name.to_string()));
        }

        let recipes = self.source.fetch_all().await?;
        info!(count = recipes.len(), "fetched recipes");

        info!("determining embedding dimension");
        let dimension = probe_dimension(self.embedder.as_ref()).await?;
        info!(dimension, model = self.embedder.model(), "embedding dimension");

        info!("processing recipes");
        let points = self.build_points(&recipes, dimension).await?;
        let indexed = points.len();

        if exists {
            info!(collection = name, "collection already exists; recreating");
            self.index.delete_collection(name).await?;
        }
        info!(collection = name, dimension, "creating collection");
        self.index
            .create_collection(name, dimension, Distance::Cosine)
            .await?;
        if let Err(err) = self.index.upsert(name, points).await {
            warn!(collection = name, error = %err, "upsert failed; dropping partial collection");
            if let Err(cleanup) = self.index.delete_collection(name).await {
                warn!(collection = name, error = %cleanup, "failed to drop partial collection");
            }
            return Err(err);
        }
        info!(count = indexed, collection = name, "successfully indexed recipes");

        Ok(IngestReport {
            indexed,
            dimension,
            recreated: exists,
        })
    }

    async fn build_points(&self, recipes: &[Recipe], dimension: usize) -> Result<Vec<IndexedPoint>> {
        let mut points = Vec::with_capacity(recipes.len());
        for recipe in recipes {
            let payload = RecipePayload::from_recipe(recipe);
            let vector = self.embedder.embed(&payload.embedding_text).await?;
            if vector.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            debug!(recipe = %recipe.slug, "embedded recipe");
            points.push(IndexedPoint {
                id: PointId::for_recipe(&recipe.id),
                vector,
                payload,
            });
        }
        Ok(points)
    }
}
