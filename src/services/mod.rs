//! Crawl orchestration and the ingest pipeline.

pub mod crawl;
pub mod ingest;

pub use crawl::{CrawlOptions, CrawlOutcome, CrawlReport, CrawlService};
pub use ingest::{DedupPolicy, IngestError, IngestOutcome, IngestService, IngestStats};
