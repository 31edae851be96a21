//! Chunking, ranking, context assembly, and vector storage for Tessera.
//!
//! The pure retrieval algorithms live in [`chunker`], [`rank`], and
//! [`context`]. [`embedding`], [`store`], and [`qdrant`] adapt the embedding
//! provider and vector index capabilities from `tessera-core`.

pub mod chunker;
pub mod context;
pub mod embedding;
pub mod qdrant;
pub mod rank;
pub mod store;
