//! Repository layer for database persistence.
//!
//! All database access goes through Diesel with diesel-async's SQLite
//! wrapper. Identifiers are stored as hyphenated UUID text, timestamps as
//! RFC 3339 text, and JSON metadata as text.

pub mod document;
pub mod migrations;
pub mod models;
pub mod pool;

pub use document::DocumentRepository;
pub use pool::{AsyncSqlitePool, DieselError};

use chrono::{DateTime, Utc};

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
