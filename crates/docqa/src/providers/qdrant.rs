//! Qdrant vector index over the REST API
//!
//! Point ids are UUIDv5 values derived from the chunk key, so re-upserting a
//! chunk replaces its point. The `document_id` payload field carries a keyword
//! index for fast filtered deletes and scrolls.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::VectorDbConfig;
use crate::error::{Error, Result};
use crate::types::{ChunkKey, SearchFilter};

use super::vector_store::{
    DistanceMetric, EntryManifest, EntryPayload, IndexEntry, ScoredEntry, VectorIndexClient,
};

const SCROLL_PAGE_SIZE: usize = 256;

/// Qdrant-backed vector index for one collection
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    collection: String,
    upsert_batch_size: usize,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Deserialize)]
struct CollectionParams {
    vectors: VectorParams,
}

#[derive(Deserialize)]
struct VectorParams {
    size: usize,
    distance: String,
}

#[derive(Serialize)]
struct PointStruct<'a> {
    id: String,
    vector: &'a [f32],
    payload: &'a EntryPayload,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    points: Vec<PointStruct<'a>>,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

#[derive(Deserialize)]
struct ScrollResult {
    points: Vec<RecordPoint>,
    next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
struct RecordPoint {
    payload: EntryPayload,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    payload: EntryPayload,
}

impl QdrantIndex {
    /// Create a client for the configured collection
    pub fn new(config: &VectorDbConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let value = HeaderValue::from_str(api_key)
                .map_err(|e| Error::config(format!("Invalid Qdrant API key: {}", e)))?;
            headers.insert("api-key", value);
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            upsert_batch_size: config.upsert_batch_size.max(1),
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    /// Send a request and decode the `result` field of the response
    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::index(format!("Qdrant {} failed: {}", operation, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(operation, status, &body));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            Error::internal(format!("Failed to parse Qdrant {} response: {}", operation, e))
        })?;
        Ok(envelope.result)
    }

    async fn collection_params(&self) -> Result<Option<VectorParams>> {
        let response = self
            .client
            .get(self.collection_url(""))
            .send()
            .await
            .map_err(|e| Error::index(format!("Qdrant collection lookup failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("collection lookup", status, &body));
        }

        let envelope: Envelope<CollectionInfo> = response.json().await.map_err(|e| {
            Error::internal(format!("Unexpected Qdrant collection info: {}", e))
        })?;
        Ok(Some(envelope.result.config.params.vectors))
    }

    async fn upsert_batch(&self, batch: &[IndexEntry]) -> Result<()> {
        let request = UpsertRequest {
            points: batch
                .iter()
                .map(|entry| PointStruct {
                    id: entry.key.point_id().to_string(),
                    vector: &entry.vector,
                    payload: &entry.payload,
                })
                .collect(),
        };

        let _: Value = self
            .call(
                "upsert",
                self.client
                    .put(self.collection_url("/points?wait=true"))
                    .json(&request),
            )
            .await?;
        Ok(())
    }
}

/// Map a non-success status: throttling and server errors are transient
fn status_error(operation: &str, status: StatusCode, body: &str) -> Error {
    let message = format!("Qdrant {} failed ({}): {}", operation, status, body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Error::index(message)
    } else {
        Error::internal(message)
    }
}

fn distance_name(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "Cosine",
        DistanceMetric::Dot => "Dot",
    }
}

/// An existing collection must match the configured size and metric
fn check_existing(
    collection: &str,
    existing: &VectorParams,
    dimension: usize,
    metric: DistanceMetric,
) -> Result<()> {
    if existing.size != dimension {
        return Err(Error::DimensionMismatch {
            expected: existing.size,
            actual: dimension,
        });
    }
    if !existing.distance.eq_ignore_ascii_case(distance_name(metric)) {
        return Err(Error::config(format!(
            "Qdrant collection '{}' uses {} distance, configured {}",
            collection,
            existing.distance,
            distance_name(metric)
        )));
    }
    Ok(())
}

/// Translate a search filter into Qdrant filter JSON
fn to_qdrant_filter(filter: &SearchFilter) -> Option<Value> {
    if filter.is_empty() {
        return None;
    }

    let mut must = Vec::new();
    if let Some(ids) = &filter.document_ids {
        must.push(json!({ "key": "document_id", "match": { "any": ids } }));
    }
    for (key, value) in &filter.tags {
        must.push(json!({ "key": format!("tags.{}", key), "match": { "value": value } }));
    }
    Some(json!({ "must": must }))
}

fn document_filter(document_id: &str) -> Value {
    json!({ "must": [{ "key": "document_id", "match": { "value": document_id } }] })
}

#[async_trait]
impl VectorIndexClient for QdrantIndex {
    async fn ensure_collection(&self, dimension: usize, metric: DistanceMetric) -> Result<()> {
        match self.collection_params().await? {
            Some(existing) => {
                check_existing(&self.collection, &existing, dimension, metric)?;
                tracing::debug!("Qdrant collection '{}' already exists", self.collection);
            }
            None => {
                let _: Value = self
                    .call(
                        "create collection",
                        self.client.put(self.collection_url("")).json(&json!({
                            "vectors": { "size": dimension, "distance": distance_name(metric) }
                        })),
                    )
                    .await?;
                tracing::info!(
                    "Created Qdrant collection '{}' ({} dims, {:?})",
                    self.collection,
                    dimension,
                    metric
                );
            }
        }

        // Creating an existing payload index is accepted by Qdrant
        let _: Value = self
            .call(
                "create payload index",
                self.client
                    .put(self.collection_url("/index?wait=true"))
                    .json(&json!({ "field_name": "document_id", "field_schema": "keyword" })),
            )
            .await?;

        Ok(())
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut failed_keys: Vec<ChunkKey> = Vec::new();
        let mut last_error = None;

        for batch in entries.chunks(self.upsert_batch_size) {
            if let Err(e) = self.upsert_batch(batch).await {
                tracing::warn!("Qdrant upsert of {} points failed: {}", batch.len(), e);
                failed_keys.extend(batch.iter().map(|entry| entry.key.clone()));
                last_error = Some(e);
            }
        }

        match last_error {
            None => Ok(()),
            Some(e) if failed_keys.len() == entries.len() && e.is_retryable() => Err(e),
            Some(e) => Err(Error::PartialUpsertFailure {
                message: e.to_string(),
                failed_keys,
            }),
        }
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize> {
        let existing = self.count(&SearchFilter::documents([document_id])).await?;
        if existing == 0 {
            return Ok(0);
        }

        let _: Value = self
            .call(
                "delete",
                self.client
                    .post(self.collection_url("/points/delete?wait=true"))
                    .json(&json!({ "filter": document_filter(document_id) })),
            )
            .await?;

        Ok(existing)
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredEntry>> {
        let mut body = json!({
            "vector": query,
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(filter) = to_qdrant_filter(filter) {
            body["filter"] = filter;
        }

        let points: Vec<ScoredPoint> = self
            .call(
                "search",
                self.client
                    .post(self.collection_url("/points/search"))
                    .json(&body),
            )
            .await?;

        Ok(points
            .into_iter()
            .map(|point| ScoredEntry {
                key: ChunkKey::new(&point.payload.document_id, point.payload.chunk_index),
                payload: point.payload,
                score: point.score,
            })
            .collect())
    }

    async fn document_manifest(&self, document_id: &str) -> Result<Vec<EntryManifest>> {
        let mut manifest = Vec::new();
        let mut offset: Option<Value> = None;

        loop {
            let mut body = json!({
                "filter": document_filter(document_id),
                "limit": SCROLL_PAGE_SIZE,
                "with_payload": true,
                "with_vector": false,
            });
            if let Some(offset) = offset.take() {
                body["offset"] = offset;
            }

            let page: ScrollResult = self
                .call(
                    "scroll",
                    self.client
                        .post(self.collection_url("/points/scroll"))
                        .json(&body),
                )
                .await?;

            manifest.extend(page.points.into_iter().map(|point| EntryManifest {
                key: ChunkKey::new(point.payload.document_id, point.payload.chunk_index),
                content_hash: point.payload.content_hash,
            }));

            match page.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => break,
            }
        }

        manifest.sort();
        Ok(manifest)
    }

    async fn count(&self, filter: &SearchFilter) -> Result<usize> {
        let mut body = json!({ "exact": true });
        if let Some(filter) = to_qdrant_filter(filter) {
            body["filter"] = filter;
        }

        let result: CountResult = self
            .call(
                "count",
                self.client
                    .post(self.collection_url("/points/count"))
                    .json(&body),
            )
            .await?;
        Ok(result.count)
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.get(format!("{}/readyz", self.base_url)).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}
