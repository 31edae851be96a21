//! Capabilities the retrieval pipeline consumes.
//!
//! Every external collaborator is reached through one of these traits so the
//! pipeline can be assembled from real adapters or in-process test doubles.

use async_trait::async_trait;

use crate::types::{
    CompletionOptions, DistanceMetric, Document, EmbeddingVector, IndexHit, IndexedPoint,
    WebCandidate,
};
use crate::Result;

/// Turns text into a fixed-dimension vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text` with `model`.
    ///
    /// Fails with [`TesseraError::EmbeddingUnavailable`](crate::TesseraError::EmbeddingUnavailable).
    async fn embed(&self, model: &str, text: &str) -> Result<EmbeddingVector>;
}

/// A persistent nearest-neighbour store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Drop and recreate collection `name`. Destructive; initialization only.
    async fn reset_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<()>;

    /// Insert or replace points in the bound collection.
    async fn upsert(&self, points: Vec<IndexedPoint>) -> Result<()>;

    /// Best `limit` points for `vector`, ordered by descending score.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<IndexHit>>;
}

/// Local notes selectable by tag.
#[async_trait]
pub trait NoteSource: Send + Sync {
    /// All notes carrying `tag`.
    async fn list_by_tag(&self, tag: &str) -> Result<Vec<Document>>;
}

/// On-demand encyclopedia content.
#[async_trait]
pub trait WebSource: Send + Sync {
    /// Candidate articles for `query`, with summaries.
    async fn search(&self, query: &str) -> Result<Vec<WebCandidate>>;

    /// Cleaned full text of the article, or `None` when it has no body.
    async fn fetch_full_text(&self, title: &str) -> Result<Option<String>>;
}

/// Language-model completion.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete `prompt` with `model` and return the raw response text.
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String>;
}
