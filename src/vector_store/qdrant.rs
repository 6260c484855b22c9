//! Qdrant REST client implementing [`VectorIndex`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{CollectionInfo, Distance, IndexedPoint, SearchHit, VectorIndex};
use crate::config::Settings;
use crate::error::{RagError, Result};

/// Long-lived Qdrant client; share it behind an `Arc`.
#[derive(Clone)]
pub struct QdrantIndex {
    client: Client,
    base: Url,
}

impl QdrantIndex {
    /// Builds a client for `url` (e.g. `http://localhost:6333`).
    ///
    /// # Arguments
    /// * `api_key` - Optional value for the `api-key` header (Qdrant Cloud)
    pub fn new(url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        let base = Url::parse(url)
            .map_err(|err| RagError::Configuration(format!("invalid Qdrant URL: {err}")))?;
        if base.cannot_be_a_base() {
            return Err(RagError::Configuration(format!(
                "Qdrant URL {base} cannot carry a path"
            )));
        }
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.map(str::trim).filter(|key| !key.is_empty()) {
            headers.insert(
                "api-key",
                HeaderValue::from_str(key)
                    .map_err(|_| RagError::Configuration("invalid Qdrant API key".into()))?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| {
                RagError::Configuration(format!("failed to build Qdrant HTTP client: {err}"))
            })?;
        Ok(Self { client, base })
    }

    /// Builds a client from the shared settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.vectordb_url,
            settings.vectordb_api_key.as_deref(),
            settings.http_timeout(),
        )
    }

    fn collection_url(&self, name: &str, tail: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("collections").push(name);
            segments.extend(tail);
        }
        url
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|err| RagError::vector_store(format!("{what}: {err}")))
    }
}

async fn read_result<T: DeserializeOwned>(resp: reqwest::Response, what: &str) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        return Err(RagError::vector_store(format!(
            "{what} failed ({status}): {body}"
        )));
    }
    let envelope: Envelope<T> = resp
        .json()
        .await
        .map_err(|err| RagError::vector_store(format!("{what}: unreadable response: {err}")))?;
    envelope
        .result
        .ok_or_else(|| RagError::vector_store(format!("{what}: response missing result")))
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let url = self.collection_url(name, &["exists"]);
        let resp = self
            .send(self.client.get(url), "collection exists check")
            .await?;
        let result: ExistsResult = read_result(resp, "collection exists check").await?;
        Ok(result.exists)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let url = self.collection_url(name, &[]);
        let resp = self.send(self.client.get(url), "collection info").await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(RagError::CollectionMissing(name.to_string()));
        }
        let result: InfoResult = read_result(resp, "collection info").await?;
        match result.config.params.vectors {
            VectorsConfig::Single(params) => Ok(CollectionInfo {
                dimension: params.size,
                distance: params.distance,
                points: result.points_count,
            }),
            VectorsConfig::Named(_) => Err(RagError::Configuration(format!(
                "collection '{name}' uses named vectors, which are not supported"
            ))),
        }
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<()> {
        if dimension == 0 {
            return Err(RagError::Configuration(
                "cannot create a collection with dimension 0".into(),
            ));
        }
        if self.collection_exists(name).await? {
            return Err(RagError::CollectionExists(name.to_string()));
        }
        let body = CreateCollection {
            vectors: VectorParams {
                size: dimension,
                distance,
            },
        };
        let url = self.collection_url(name, &[]);
        let resp = self
            .send(self.client.put(url).json(&body), "create collection")
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            return Err(RagError::CollectionExists(name.to_string()));
        }
        let _: Value = read_result(resp, "create collection").await?;
        debug!(collection = name, dimension, ?distance, "created collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let url = self.collection_url(name, &[]);
        let resp = self
            .send(self.client.delete(url), "delete collection")
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let _: Value = read_result(resp, "delete collection").await?;
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<IndexedPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let count = points.len();
        let mut url = self.collection_url(name, &["points"]);
        url.query_pairs_mut().append_pair("wait", "true");
        let body = UpsertPoints { points };
        let resp = self
            .send(self.client.put(url).json(&body), "upsert points")
            .await?;
        let result: UpdateResult = read_result(resp, "upsert points").await?;
        if result.status != "completed" {
            return Err(RagError::vector_store(format!(
                "upsert of {count} points finished with status '{}'",
                result.status
            )));
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
        if k == 0 || vector.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.collection_url(name, &["points", "query"]);
        let body = QueryPoints {
            query: vector,
            limit: k,
            with_payload: true,
            score_threshold,
        };
        let resp = self
            .send(self.client.post(url).json(&body), "query points")
            .await?;
        let result: QueryResult = read_result(resp, "query points").await?;
        let mut hits = result.points;
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "Option::default")]
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct InfoResult {
    #[serde(default)]
    points_count: Option<u64>,
    config: InfoConfig,
}

#[derive(Debug, Deserialize)]
struct InfoConfig {
    params: InfoParams,
}

#[derive(Debug, Deserialize)]
struct InfoParams {
    vectors: VectorsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VectorsConfig {
    Single(VectorParams),
    Named(serde::de::IgnoredAny),
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorParams {
    size: usize,
    distance: Distance,
}

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct UpsertPoints {
    points: Vec<IndexedPoint>,
}

#[derive(Debug, Deserialize)]
struct UpdateResult {
    status: String,
}

#[derive(Serialize)]
struct QueryPoints<'a> {
    query: &'a [f32],
    limit: usize,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_threshold: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    points: Vec<SearchHit>,
}
