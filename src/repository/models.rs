//! Diesel row models for the documents and blob tables.

use diesel::prelude::*;

use crate::schema;

/// Document row as stored.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DocumentRecord {
    pub id: String,
    pub url: String,
    pub name: String,
    pub path: Option<String>,
    pub scraper: String,
    pub version: String,
    pub data: String,
    pub timestamp: Option<String>,
    pub ingested_at: String,
}

/// New document for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::documents)]
pub struct NewDocument<'a> {
    pub id: &'a str,
    pub url: &'a str,
    pub name: &'a str,
    pub path: Option<&'a str>,
    pub scraper: &'a str,
    pub version: &'a str,
    pub data: &'a str,
    pub timestamp: Option<&'a str>,
    pub ingested_at: &'a str,
}

/// Blob row as stored.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::scraper_blob_store)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BlobRecord {
    pub id: i32,
    pub file_content_type: String,
    pub source_file: Vec<u8>,
    pub document_id: String,
}

/// New blob for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::scraper_blob_store)]
pub struct NewBlob<'a> {
    pub file_content_type: &'a str,
    pub source_file: &'a [u8],
    pub document_id: &'a str,
}
