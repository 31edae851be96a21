//! Qdrant vector index over the `qdrant-client` gRPC client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, DeleteCollectionBuilder, Distance, PointStruct, ScoredPoint,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Qdrant, QdrantError};
use tessera_core::{DistanceMetric, IndexHit, IndexedPoint, Payload, TesseraError, VectorIndex};

/// [`VectorIndex`] backed by a Qdrant server, bound to one collection.
///
/// The client connects lazily, so construction never touches the network.
pub struct QdrantIndex {
    client: Qdrant,
    url: String,
    collection: String,
}

impl std::fmt::Debug for QdrantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex")
            .field("url", &self.url)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

fn distance(metric: DistanceMetric) -> Distance {
    match metric {
        DistanceMetric::Cosine => Distance::Cosine,
        DistanceMetric::Dot => Distance::Dot,
    }
}

fn unavailable(action: &str, e: QdrantError) -> TesseraError {
    TesseraError::IndexUnavailable(format!("Qdrant {action} failed: {e}"))
}

impl QdrantIndex {
    /// Create an index client for `collection` on the server at `url`.
    ///
    /// `timeout` bounds every request.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::Config`] if the client cannot be built from `url`.
    pub fn new(url: &str, collection: &str, timeout: Duration) -> Result<Self, TesseraError> {
        let url = url.trim_end_matches('/').to_string();
        let client = Qdrant::from_url(&url)
            .timeout(timeout)
            .build()
            .map_err(|e| TesseraError::Config(format!("invalid Qdrant url '{url}': {e}")))?;
        Ok(Self {
            client,
            url,
            collection: collection.to_string(),
        })
    }

    /// The collection this index reads and writes.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Whether the bound collection exists on the server.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::IndexUnavailable`] if the server cannot be reached.
    pub async fn collection_exists(&self) -> Result<bool, TesseraError> {
        self.client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| unavailable("collection lookup", e))
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn reset_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), TesseraError> {
        tracing::debug!(collection = name, dimension, %metric, "recreating qdrant collection");

        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| unavailable("collection lookup", e))?;
        if exists {
            self.client
                .delete_collection(DeleteCollectionBuilder::new(name))
                .await
                .map_err(|e| unavailable("delete collection", e))?;
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, distance(metric))),
            )
            .await
            .map_err(|e| unavailable("create collection", e))?;
        Ok(())
    }

    async fn upsert(&self, points: Vec<IndexedPoint>) -> Result<(), TesseraError> {
        if points.is_empty() {
            return Ok(());
        }
        let points: Vec<PointStruct> = points.into_iter().map(to_point).collect();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| unavailable("upsert", e))?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<IndexHit>, TesseraError> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), limit as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| unavailable("search", e))?;
        Ok(into_hits(response.result))
    }
}

fn to_point(point: IndexedPoint) -> PointStruct {
    let mut payload = qdrant_client::Payload::new();
    payload.insert("text", point.payload.text);
    if let Some(title) = point.payload.title {
        payload.insert("title", title);
    }
    PointStruct::new(point.id, point.vector, payload)
}

fn string_field(fields: &HashMap<String, Value>, key: &str) -> Option<String> {
    match fields.get(key).and_then(|value| value.kind.as_ref()) {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Points without a `text` payload are not ours and are skipped.
fn into_hits(points: Vec<ScoredPoint>) -> Vec<IndexHit> {
    points
        .into_iter()
        .filter_map(|point| {
            let text = string_field(&point.payload, "text")?;
            Some(IndexHit {
                payload: Payload {
                    title: string_field(&point.payload, "title"),
                    text,
                },
                score: f64::from(point.score),
            })
        })
        .collect()
}
