//! Test doubles shared by the unit tests: a stub HTTP server helper and
//! in-memory fakes for every service trait.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use tokio::sync::mpsc;

use crate::embedder::Embedder;
use crate::error::{RagError, Result};
use crate::llm::{ChatMessage, ChatModel, ChunkStream};
use crate::mealie::RecipeSource;
use crate::recipe::Recipe;
use crate::vector_store::{
    CollectionInfo, Distance, IndexedPoint, PointId, RecipePayload, SearchHit, VectorIndex,
};

/// Serves `router` on an ephemeral local port and returns its base URL.
pub(crate) async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });
    format!("http://{addr}")
}

/// `n` small recipes named `Recipe 0`..`Recipe n-1`.
pub(crate) fn recipes(n: usize) -> Vec<Recipe> {
    (0..n)
        .map(|i| Recipe {
            id: format!("recipe-{i}"),
            slug: format!("recipe-{i}"),
            name: format!("Recipe {i}"),
            description: None,
            category: vec!["Dinner".to_string()],
            tags: vec![],
            rating: Some(3.0),
            ingredients: vec![format!("{i} cups water")],
            instructions: vec!["Boil.".to_string()],
        })
        .collect()
}

/// Bag-of-words embedder: texts sharing words get similar vectors.
pub(crate) struct FakeEmbedder {
    dimension: usize,
    calls: AtomicUsize,
    fail_after: Option<usize>,
    overrides: Vec<(String, usize)>,
}

impl FakeEmbedder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            fail_after: None,
            overrides: Vec::new(),
        }
    }

    /// Every call past the first `ok_calls` fails.
    pub(crate) fn failing_after(mut self, ok_calls: usize) -> Self {
        self.fail_after = Some(ok_calls);
        self
    }

    pub(crate) fn failing() -> Self {
        Self::new(8).failing_after(0)
    }

    /// Texts starting with `prefix` embed to `dimension` instead.
    pub(crate) fn with_override(mut self, prefix: &str, dimension: usize) -> Self {
        self.overrides.push((prefix.to_string(), dimension));
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn vector(&self, text: &str) -> Vec<f32> {
        let dimension = self
            .overrides
            .iter()
            .find(|(prefix, _)| text.starts_with(prefix.as_str()))
            .map(|(_, dim)| *dim)
            .unwrap_or(self.dimension);
        if dimension == 0 {
            return Vec::new();
        }
        let mut vector = vec![0.0; dimension];
        vector[0] = 0.01;
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % dimension as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model(&self) -> &str {
        "fake-embedder"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|ok| call >= ok) {
            return Err(RagError::Embedding("embedding service unavailable".into()));
        }
        Ok(self.vector(text))
    }
}

struct FakeCollection {
    dimension: usize,
    distance: Distance,
    points: Vec<IndexedPoint>,
}

/// In-memory cosine index.
#[derive(Default)]
pub(crate) struct FakeIndex {
    collections: Mutex<HashMap<String, FakeCollection>>,
    upserts: AtomicUsize,
    searches: AtomicUsize,
    fail_upserts: bool,
    fail_searches: bool,
}

impl FakeIndex {
    pub(crate) fn failing_upserts(mut self) -> Self {
        self.fail_upserts = true;
        self
    }

    pub(crate) fn failing_searches(mut self) -> Self {
        self.fail_searches = true;
        self
    }

    /// Creates `name` holding `count` filler points.
    pub(crate) fn seed(&self, name: &str, dimension: usize, count: usize) {
        let points = recipes(count)
            .iter()
            .map(|recipe| IndexedPoint {
                id: PointId::for_recipe(&format!("seed-{}", recipe.id)),
                vector: vec![1.0; dimension],
                payload: RecipePayload::from_recipe(recipe),
            })
            .collect();
        self.insert(name, dimension, points);
    }

    /// Creates `name` holding `recipes` embedded with `embedder`.
    pub(crate) fn index_recipes(&self, name: &str, embedder: &FakeEmbedder, recipes: &[Recipe]) {
        let points = recipes
            .iter()
            .map(|recipe| {
                let payload = RecipePayload::from_recipe(recipe);
                IndexedPoint {
                    id: PointId::for_recipe(&recipe.id),
                    vector: embedder.vector(&payload.embedding_text),
                    payload,
                }
            })
            .collect();
        self.insert(name, embedder.dimension, points);
    }

    /// Creates `name` holding the given points.
    pub(crate) fn insert(&self, name: &str, dimension: usize, points: Vec<IndexedPoint>) {
        self.collections.lock().expect("index lock").insert(
            name.to_string(),
            FakeCollection {
                dimension,
                distance: Distance::Cosine,
                points,
            },
        );
    }

    pub(crate) fn dimension(&self, name: &str) -> Option<usize> {
        self.collections
            .lock()
            .expect("index lock")
            .get(name)
            .map(|c| c.dimension)
    }

    pub(crate) fn point_count(&self, name: &str) -> usize {
        self.collections
            .lock()
            .expect("index lock")
            .get(name)
            .map_or(0, |c| c.points.len())
    }

    pub(crate) fn vectors(&self, name: &str) -> Vec<Vec<f32>> {
        self.collections
            .lock()
            .expect("index lock")
            .get(name)
            .map(|c| c.points.iter().map(|p| p.vector.clone()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub(crate) fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.lock().expect("index lock").contains_key(name))
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let collections = self.collections.lock().expect("index lock");
        let collection = collections
            .get(name)
            .ok_or_else(|| RagError::CollectionMissing(name.to_string()))?;
        Ok(CollectionInfo {
            dimension: collection.dimension,
            distance: collection.distance,
            points: Some(collection.points.len() as u64),
        })
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<()> {
        let mut collections = self.collections.lock().expect("index lock");
        if collections.contains_key(name) {
            return Err(RagError::CollectionExists(name.to_string()));
        }
        collections.insert(
            name.to_string(),
            FakeCollection {
                dimension,
                distance,
                points: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.lock().expect("index lock").remove(name);
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<IndexedPoint>) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_upserts {
            return Err(RagError::VectorStore("upsert rejected".into()));
        }
        let mut collections = self.collections.lock().expect("index lock");
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| RagError::VectorStore(format!("no collection {name}")))?;
        if points.iter().any(|p| p.vector.len() != collection.dimension) {
            return Err(RagError::VectorStore("wrong vector dimension".into()));
        }
        for point in points {
            collection.points.retain(|existing| existing.id != point.id);
            collection.points.push(point);
        }
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchHit>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_searches {
            return Err(RagError::VectorStore("search failed".into()));
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let collections = self.collections.lock().expect("index lock");
        let collection = collections
            .get(name)
            .ok_or_else(|| RagError::VectorStore(format!("no collection {name}")))?;
        let mut hits: Vec<SearchHit> = collection
            .points
            .iter()
            .map(|point| SearchHit {
                id: point.id.clone(),
                score: cosine(&point.vector, vector),
                payload: point.payload.clone(),
            })
            .filter(|hit| score_threshold.map_or(true, |min| hit.score >= min))
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}

enum Script {
    Chunks(Vec<String>),
    FailToStart,
    FailMidway(Vec<String>),
    Endless,
}

/// Scripted chat model. Records every request it receives.
pub(crate) struct FakeChat {
    script: Script,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    producer_done: Arc<AtomicBool>,
}

impl FakeChat {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
            producer_done: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn replying(chunks: &[&str]) -> Self {
        Self::with_script(Script::Chunks(chunks.iter().map(|c| c.to_string()).collect()))
    }

    pub(crate) fn failing() -> Self {
        Self::with_script(Script::FailToStart)
    }

    pub(crate) fn failing_midway(chunks: &[&str]) -> Self {
        Self::with_script(Script::FailMidway(
            chunks.iter().map(|c| c.to_string()).collect(),
        ))
    }

    /// Streams until the receiver goes away.
    pub(crate) fn endless() -> Self {
        Self::with_script(Script::Endless)
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    pub(crate) fn last_request(&self) -> Option<Vec<ChatMessage>> {
        self.requests.lock().expect("requests lock").last().cloned()
    }

    /// Whether the producer task of the last stream has exited.
    pub(crate) fn producer_stopped(&self) -> bool {
        self.producer_done.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    fn model(&self) -> &str {
        "fake-chat"
    }

    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ChunkStream> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(messages.to_vec());
        let (tx, rx) = mpsc::channel(4);
        let done = self.producer_done.clone();
        done.store(false, Ordering::SeqCst);
        match &self.script {
            Script::FailToStart => return Err(RagError::Llm("model offline".into())),
            Script::Chunks(chunks) | Script::FailMidway(chunks) => {
                let chunks = chunks.clone();
                let fail = matches!(self.script, Script::FailMidway(_));
                tokio::spawn(async move {
                    for chunk in chunks {
                        if tx.send(Ok(chunk)).await.is_err() {
                            break;
                        }
                    }
                    if fail {
                        let _ = tx.send(Err(RagError::Llm("stream cut".into()))).await;
                    }
                    done.store(true, Ordering::SeqCst);
                });
            }
            Script::Endless => {
                tokio::spawn(async move {
                    while tx.send(Ok("tick ".to_string())).await.is_ok() {
                        tokio::task::yield_now().await;
                    }
                    done.store(true, Ordering::SeqCst);
                });
            }
        }
        Ok(rx)
    }
}

/// Fixed recipe catalogue.
pub(crate) struct FakeSource {
    recipes: Vec<Recipe>,
}

impl FakeSource {
    pub(crate) fn new(recipes: Vec<Recipe>) -> Self {
        Self { recipes }
    }
}

#[async_trait]
impl RecipeSource for FakeSource {
    async fn fetch_all(&self) -> Result<Vec<Recipe>> {
        Ok(self.recipes.clone())
    }

    async fn fetch_recipe(&self, slug_or_id: &str) -> Result<Recipe> {
        self.recipes
            .iter()
            .find(|r| r.slug == slug_or_id || r.id == slug_or_id)
            .cloned()
            .ok_or_else(|| RagError::NotFound(slug_or_id.to_string()))
    }
}
