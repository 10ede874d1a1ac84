//! Document repository: lookups and the transactional two-table upsert.

use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::models::{BlobRecord, DocumentRecord, NewBlob, NewDocument};
use super::pool::{AsyncSqlitePool, DieselError};
use super::{parse_datetime, parse_datetime_opt};
use crate::models::{Blob, Document};
use crate::schema::{documents, scraper_blob_store};

/// Repository over the documents and blob tables.
#[derive(Clone)]
pub struct DocumentRepository {
    pool: AsyncSqlitePool,
}

impl DocumentRepository {
    /// Create a new document repository.
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Look up the identity of the document holding a URL, if any.
    pub async fn find_id_by_url(&self, url: &str) -> Result<Option<String>, DieselError> {
        let mut conn = self.pool.get().await?;

        documents::table
            .filter(documents::url.eq(url))
            .select(documents::id)
            .first::<String>(&mut conn)
            .await
            .optional()
    }

    /// Check whether a document with this identity already exists.
    pub async fn identity_exists(&self, id: &str) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let count: i64 = documents::table
            .filter(documents::id.eq(id))
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count > 0)
    }

    /// Fetch a document by identity (metadata only, no blob bytes).
    pub async fn get(&self, id: &str) -> Result<Option<Document>, DieselError> {
        let mut conn = self.pool.get().await?;

        documents::table
            .find(id)
            .first::<DocumentRecord>(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(record_to_document))
    }

    /// Fetch the blob stored for a document.
    pub async fn get_blob(&self, document_id: &str) -> Result<Option<BlobRecord>, DieselError> {
        let mut conn = self.pool.get().await?;

        scraper_blob_store::table
            .filter(scraper_blob_store::document_id.eq(document_id))
            .first::<BlobRecord>(&mut conn)
            .await
            .optional()
    }

    /// Count all documents.
    pub async fn count(&self) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let count: i64 = documents::table
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count as u64)
    }

    /// Count all stored blobs.
    pub async fn blob_count(&self) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let count: i64 = scraper_blob_store::table
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count as u64)
    }

    /// Upsert a document and its blob in one transaction.
    ///
    /// Both writes commit together or neither does; a document without its
    /// blob is an invalid state for this store. Conflicts on the identity
    /// primary key or on the blob's unique document reference resolve as
    /// updates, which turns the check-then-act race between concurrent
    /// ingestions of the same new URL into a second update instead of a
    /// failure.
    pub async fn upsert_with_blob(&self, doc: &Document, blob: &Blob) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        let data = serde_json::to_string(&doc.data).unwrap_or_else(|_| "{}".to_string());
        let timestamp = doc.timestamp.map(|t| t.to_rfc3339());
        let ingested_at = doc.ingested_at.to_rfc3339();

        let new_doc = NewDocument {
            id: &doc.id,
            url: &doc.url,
            name: &doc.name,
            path: doc.path.as_deref(),
            scraper: &doc.scraper,
            version: &doc.version,
            data: &data,
            timestamp: timestamp.as_deref(),
            ingested_at: &ingested_at,
        };
        let new_blob = NewBlob {
            file_content_type: &blob.file_content_type,
            source_file: &blob.source_file,
            document_id: &blob.document_id,
        };

        conn.transaction(|conn| {
            Box::pin(async move {
                diesel::insert_into(documents::table)
                    .values(&new_doc)
                    .on_conflict(documents::id)
                    .do_update()
                    .set((
                        documents::url.eq(excluded(documents::url)),
                        documents::name.eq(excluded(documents::name)),
                        documents::path.eq(excluded(documents::path)),
                        documents::scraper.eq(excluded(documents::scraper)),
                        documents::version.eq(excluded(documents::version)),
                        documents::data.eq(excluded(documents::data)),
                        documents::timestamp.eq(excluded(documents::timestamp)),
                        documents::ingested_at.eq(excluded(documents::ingested_at)),
                    ))
                    .execute(conn)
                    .await?;

                diesel::insert_into(scraper_blob_store::table)
                    .values(&new_blob)
                    .on_conflict(scraper_blob_store::document_id)
                    .do_update()
                    .set((
                        scraper_blob_store::file_content_type
                            .eq(excluded(scraper_blob_store::file_content_type)),
                        scraper_blob_store::source_file
                            .eq(excluded(scraper_blob_store::source_file)),
                    ))
                    .execute(conn)
                    .await?;

                Ok(())
            })
        })
        .await
    }
}

fn record_to_document(record: DocumentRecord) -> Document {
    Document {
        id: record.id,
        url: record.url,
        name: record.name,
        path: record.path,
        scraper: record.scraper,
        version: record.version,
        data: serde_json::from_str(&record.data).unwrap_or(serde_json::Value::Null),
        timestamp: parse_datetime_opt(record.timestamp),
        ingested_at: parse_datetime(&record.ingested_at),
    }
}
