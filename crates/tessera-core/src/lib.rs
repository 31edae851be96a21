//! Core types, configuration, and error handling for Tessera.
//!
//! This crate provides the shared foundation used by all other Tessera crates:
//! - [`TesseraError`]: unified error type using `thiserror`
//! - [`TesseraConfig`]: configuration loaded from `.tessera.toml`
//! - The retrieval data model: [`Document`], [`Chunk`], [`IndexedPoint`],
//!   [`ScoredCandidate`], [`Context`], [`Query`], [`QueryOutcome`]
//! - Collaborator traits in [`traits`]: [`Embedder`], [`VectorIndex`],
//!   [`NoteSource`], [`WebSource`], [`CompletionProvider`]

mod config;
mod error;
pub mod traits;
mod types;

pub use config::{
    EmbeddingConfig, IndexBackend, IndexConfig, LlmConfig, NotesConfig, RetrievalConfig,
    TesseraConfig, WebConfig,
};
pub use error::TesseraError;
pub use traits::{CompletionProvider, Embedder, NoteSource, VectorIndex, WebSource};
pub use types::{
    Answer, Candidate, Chunk, CompletionOptions, Context, DistanceMetric, Document,
    EmbeddingVector, IndexHit, IndexedPoint, OutputFormat, Payload, Query, QueryOutcome,
    RunReport, ScoredCandidate, Stage, WebCandidate, UNTITLED,
};

/// A convenience `Result` type for Tessera operations.
pub type Result<T> = std::result::Result<T, TesseraError>;
