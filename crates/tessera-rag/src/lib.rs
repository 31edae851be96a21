//! Retrieval-augmented answering for Tessera.
//!
//! Provides the chat client for the completion model, prompt rendering, and
//! the [`pipeline::RagPipeline`] that ties note collection, web scraping,
//! retrieval, ranking, and completion together.

pub mod llm;
pub mod pipeline;
pub mod prompt;
