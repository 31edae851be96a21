//! Document sources for Tessera.
//!
//! - [`notes::VaultNotes`] reads tagged Markdown notes from a local vault.
//! - [`wiki::WikipediaClient`] searches Wikipedia and fetches cleaned articles.
//! - [`html::HtmlCleaner`] turns article HTML into plain text.

pub mod html;
pub mod notes;
pub mod wiki;
