//! Domain models for acquired documents.

mod document;

pub use document::{Blob, Document, DocumentItem, DEFAULT_SCRAPER_VERSION};
