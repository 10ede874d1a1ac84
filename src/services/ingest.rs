//! Transactional ingest pipeline.
//!
//! Validates assembled records, normalizes their identity, applies the
//! configured dedup policy, and commits the document/blob pair atomically.
//! Per-record failures are isolated: they are logged and counted, never
//! fatal to the run.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::identity::{coerce_identity, IdentitySource, MalformedIdentity};
use crate::models::{Blob, Document, DocumentItem, DEFAULT_SCRAPER_VERSION};
use crate::repository::{DieselError, DocumentRepository};

/// Which key decides that two ingestions refer to the same document.
///
/// The two policies differ materially: URL dedup always updates the existing
/// row in place, content-hash dedup skips the record entirely on a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// URL equality: re-ingesting a known URL updates the existing row.
    #[default]
    Url,
    /// Content-hash equality: a known identity skips the record entirely.
    ContentHash,
}

/// Process-lifetime progress counters, monotonically increasing.
#[derive(Debug, Default)]
pub struct IngestStats {
    saved_items: AtomicU64,
    save_errors: AtomicU64,
}

impl IngestStats {
    pub fn saved_items(&self) -> u64 {
        self.saved_items.load(Ordering::Relaxed)
    }

    pub fn save_errors(&self) -> u64 {
        self.save_errors.load(Ordering::Relaxed)
    }
}

/// Why a record was not written.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Required field missing or of the wrong shape; nothing was written.
    #[error("validation failed for {url:?}: {reason}")]
    Validation { url: String, reason: String },

    /// The supplied identity could not be normalized.
    #[error("identity for {url}: {source}")]
    Identity {
        url: String,
        #[source]
        source: MalformedIdentity,
    },

    /// The store rejected the write; the transaction rolled back. Carries
    /// the store's own diagnostic text so the root cause is visible without
    /// re-running the crawl.
    #[error("constraint violation for {url}: {detail}")]
    Constraint { url: String, detail: String },

    /// Connectivity-style store failure; the transaction rolled back but the
    /// record itself was valid and may be retried.
    #[error("store error for {url}: {source}")]
    Store {
        url: String,
        #[source]
        source: DieselError,
    },
}

impl IngestError {
    /// Whether the orchestrator may retry the record.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Store { .. })
    }
}

/// Outcome of one successfully handled record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Committed (insert or in-place update).
    Saved,
    /// Skipped: an existing document already carries this content identity.
    DuplicateContent,
}

/// The upsert pipeline.
pub struct IngestService {
    repo: DocumentRepository,
    scraper_name: String,
    dedup: DedupPolicy,
    stats: IngestStats,
}

impl IngestService {
    /// Create a new ingest service.
    pub fn new(repo: DocumentRepository, scraper_name: &str, dedup: DedupPolicy) -> Self {
        Self {
            repo,
            scraper_name: scraper_name.to_string(),
            dedup,
            stats: IngestStats::default(),
        }
    }

    /// Progress counters for this service's lifetime.
    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Run one record through validate, normalize, resolve and the atomic
    /// write. Safe to call concurrently; the store's constraints resolve the
    /// check-then-act window between racing first-time ingestions.
    pub async fn process_item(&self, item: &DocumentItem) -> Result<IngestOutcome, IngestError> {
        let (blob_bytes, supplied) = validate(item)?;

        let identity = coerce_identity(supplied).map_err(|source| IngestError::Identity {
            url: item.url.clone(),
            source,
        })?;

        // Dedup resolution. URL is the primary application-level key; the
        // content identity only names brand-new rows.
        let effective_id = match self.dedup {
            DedupPolicy::Url => {
                let existing = self
                    .repo
                    .find_id_by_url(&item.url)
                    .await
                    .map_err(|e| self.store_failure(&item.url, e))?;
                existing.unwrap_or_else(|| identity.to_string())
            }
            DedupPolicy::ContentHash => {
                let id = identity.to_string();
                let exists = self
                    .repo
                    .identity_exists(&id)
                    .await
                    .map_err(|e| self.store_failure(&item.url, e))?;
                if exists {
                    info!(
                        "Skipping {}: content identity {} already ingested",
                        item.url, id
                    );
                    return Ok(IngestOutcome::DuplicateContent);
                }
                id
            }
        };

        let document = Document {
            id: effective_id.clone(),
            url: item.url.clone(),
            name: item.name.clone(),
            path: item.path.clone(),
            scraper: item
                .scraper
                .clone()
                .unwrap_or_else(|| self.scraper_name.clone()),
            version: item
                .version
                .clone()
                .unwrap_or_else(|| DEFAULT_SCRAPER_VERSION.to_string()),
            data: item.data.clone(),
            timestamp: item.timestamp,
            ingested_at: Utc::now(),
        };
        let blob = Blob {
            file_content_type: item.content_type.clone(),
            source_file: blob_bytes.to_vec(),
            document_id: effective_id,
        };

        match self.repo.upsert_with_blob(&document, &blob).await {
            Ok(()) => {
                self.stats.saved_items.fetch_add(1, Ordering::Relaxed);
                info!("Saved {} ({})", document.name, document.url);
                Ok(IngestOutcome::Saved)
            }
            Err(e) => Err(self.store_failure(&item.url, e)),
        }
    }

    fn store_failure(&self, url: &str, e: DieselError) -> IngestError {
        self.stats.save_errors.fetch_add(1, Ordering::Relaxed);
        classify_store_error(url, e)
    }
}

fn validate(item: &DocumentItem) -> Result<(&[u8], &IdentitySource), IngestError> {
    let fail = |reason: &str| IngestError::Validation {
        url: item.url.clone(),
        reason: reason.to_string(),
    };

    if item.url.trim().is_empty() {
        return Err(fail("missing url"));
    }
    if item.name.trim().is_empty() {
        return Err(fail("missing name"));
    }
    if item.content_type.trim().is_empty() {
        return Err(fail("missing content type"));
    }

    let blob = item.blob.as_deref().ok_or_else(|| fail("missing blob bytes"))?;
    if blob.is_empty() {
        return Err(fail("empty blob bytes"));
    }

    let identity = item
        .identity
        .as_ref()
        .ok_or_else(|| fail("missing identity"))?;

    Ok((blob, identity))
}

fn classify_store_error(url: &str, e: DieselError) -> IngestError {
    match e {
        DieselError::DatabaseError(kind, info)
            if matches!(
                kind,
                DatabaseErrorKind::UniqueViolation
                    | DatabaseErrorKind::NotNullViolation
                    | DatabaseErrorKind::ForeignKeyViolation
                    | DatabaseErrorKind::CheckViolation
            ) =>
        {
            IngestError::Constraint {
                url: url.to_string(),
                detail: info.message().to_string(),
            }
        }
        other => IngestError::Store {
            url: url.to_string(),
            source: other,
        },
    }
}
