//! Vector index abstraction plus the records stored in it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::recipe::Recipe;

pub mod qdrant;

pub use qdrant::QdrantIndex;

/// Similarity metric of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    /// Cosine similarity; higher scores are more relevant.
    Cosine,
    /// Dot product.
    Dot,
    /// Euclidean distance.
    Euclid,
    /// Manhattan distance.
    Manhattan,
}

/// Point identifier: Qdrant accepts unsigned integers and UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    /// Sequential integer id.
    Num(u64),
    /// UUID id.
    Uuid(Uuid),
}

impl PointId {
    /// Stable id for a recipe: its own id when that is a UUID, otherwise a
    /// UUIDv5 derived from it.
    pub fn for_recipe(recipe_id: &str) -> Self {
        match Uuid::parse_str(recipe_id) {
            Ok(uuid) => Self::Uuid(uuid),
            Err(_) => Self::Uuid(Uuid::new_v5(&Uuid::NAMESPACE_OID, recipe_id.as_bytes())),
        }
    }
}

/// Non-vector metadata stored with each recipe vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipePayload {
    /// Mealie recipe id.
    pub recipe_id: String,
    /// Mealie slug.
    pub slug: String,
    /// Recipe name.
    pub name: String,
    /// Category names.
    #[serde(default)]
    pub category: Vec<String>,
    /// Tag names.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Rating, when the recipe has one.
    #[serde(default)]
    pub rating: Option<f32>,
    /// The exact text that was embedded.
    #[serde(alias = "text")]
    pub embedding_text: String,
}

impl RecipePayload {
    /// Projects the payload fields out of a recipe.
    pub fn from_recipe(recipe: &Recipe) -> Self {
        Self {
            recipe_id: recipe.id.clone(),
            slug: recipe.slug.clone(),
            name: recipe.name.clone(),
            category: recipe.category.clone(),
            tags: recipe.tags.clone(),
            rating: recipe.rating,
            embedding_text: recipe.embedding_text(),
        }
    }
}

/// A vector plus payload, as written to the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedPoint {
    /// Point identifier.
    pub id: PointId,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Recipe metadata.
    pub payload: RecipePayload,
}

/// A retrieved point with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Point identifier.
    pub id: PointId,
    /// Similarity score; higher is more relevant.
    pub score: f32,
    /// Recipe metadata.
    pub payload: RecipePayload,
}

/// Shape of an existing collection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectionInfo {
    /// Vector dimension.
    pub dimension: usize,
    /// Distance metric.
    pub distance: Distance,
    /// Stored point count, when reported.
    pub points: Option<u64>,
}

/// Named, dimension-fixed vector collections with similarity search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Whether `name` exists.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Dimension, metric and size of `name`; `CollectionMissing` when absent.
    async fn collection_info(&self, name: &str) -> Result<CollectionInfo>;

    /// Creates `name`; fails with `CollectionExists` when it is already present.
    async fn create_collection(&self, name: &str, dimension: usize, distance: Distance)
        -> Result<()>;

    /// Removes `name`. Removing a missing collection succeeds.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Inserts or replaces `points` by id in one request. Success means every
    /// point was written.
    async fn upsert(&self, name: &str, points: Vec<IndexedPoint>) -> Result<()>;

    /// Returns at most `k` hits by descending score, skipping those under
    /// `score_threshold`. `k == 0` returns nothing.
    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchHit>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::parfait;
    use serde_json::json;

    #[test]
    fn recipe_uuid_is_reused_as_point_id() {
        let id = PointId::for_recipe("487a6099-f164-4f70-8f61-e73b82935333");
        assert_eq!(
            serde_json::to_value(&id).expect("serialize"),
            json!("487a6099-f164-4f70-8f61-e73b82935333")
        );
    }

    #[test]
    fn non_uuid_ids_map_to_stable_uuids() {
        let first = PointId::for_recipe("pancakes");
        assert_eq!(first, PointId::for_recipe("pancakes"));
        assert_ne!(first, PointId::for_recipe("waffles"));
    }

    #[test]
    fn payload_reads_legacy_text_key() {
        let payload: RecipePayload = serde_json::from_value(json!({
            "recipe_id": "1",
            "slug": "toast",
            "name": "Toast",
            "category": ["Breakfast"],
            "tags": [],
            "rating": null,
            "text": "Title: Toast\n"
        }))
        .expect("payload");
        assert_eq!(payload.embedding_text, "Title: Toast\n");
        assert_eq!(payload.rating, None);
    }

    #[test]
    fn payload_carries_embedding_text() {
        let recipe = parfait();
        let payload = RecipePayload::from_recipe(&recipe);
        assert_eq!(payload.recipe_id, recipe.id);
        assert_eq!(payload.embedding_text, recipe.embedding_text());
        assert_eq!(payload.rating, Some(5.0));
    }

    #[test]
    fn numeric_point_ids_round_trip_from_qdrant() {
        let hit: SearchHit = serde_json::from_value(json!({
            "id": 3,
            "version": 1,
            "score": 0.87,
            "payload": {"recipe_id": "r", "slug": "s", "name": "n", "embedding_text": "t"}
        }))
        .expect("hit");
        assert_eq!(hit.id, PointId::Num(3));
    }
}
