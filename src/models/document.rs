//! Document and record types for the acquisition pipeline.
//!
//! A `Document` row holds the searchable metadata; its bytes live in a
//! single companion blob row keyed by the document identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::IdentitySource;

/// Scraper version recorded when a record does not carry one.
pub const DEFAULT_SCRAPER_VERSION: &str = "1.0";

/// A persisted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Canonical 128-bit identifier, content-derived.
    pub id: String,
    /// Source URL. At most one live document per URL; re-ingesting a known
    /// URL updates the existing row.
    pub url: String,
    /// Display name.
    pub name: String,
    /// Advisory taxonomy path, e.g. "wto.docs.decisions".
    pub path: Option<String>,
    /// Name of the scraper that produced the row.
    pub scraper: String,
    /// Scraper version string.
    pub version: String,
    /// Arbitrary structured metadata.
    pub data: serde_json::Value,
    /// Collection timestamp reported by the scraper.
    pub timestamp: Option<DateTime<Utc>>,
    /// When the pipeline last wrote the row.
    pub ingested_at: DateTime<Utc>,
}

/// Raw document bytes; exactly one per document.
#[derive(Debug, Clone)]
pub struct Blob {
    pub file_content_type: String,
    pub source_file: Vec<u8>,
    pub document_id: String,
}

/// One assembled record handed to the ingest pipeline.
///
/// Optional fields carry the caller-facing defaults: `scraper` falls back to
/// the configured crawl name, `version` to [`DEFAULT_SCRAPER_VERSION`], and
/// `data` to an empty object.
#[derive(Debug, Clone)]
pub struct DocumentItem {
    pub url: String,
    pub name: String,
    pub path: Option<String>,
    pub scraper: Option<String>,
    pub version: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub data: serde_json::Value,
    pub content_type: String,
    /// Raw document bytes; None when the download was skipped upstream.
    pub blob: Option<Vec<u8>>,
    /// Identity supplied with the record, in any coercible shape.
    pub identity: Option<IdentitySource>,
}
