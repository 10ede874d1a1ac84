//! Crawl orchestration.
//!
//! One sequential worker drives the listing end-to-end: the session's hidden
//! tokens are only valid against the page that produced them, so exactly one
//! listing request is ever in flight. Detail downloads for the items found
//! on each page run concurrently with each other and with pagination, and
//! drain before the run ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::identity::{digest_hex, IdentitySource};
use crate::models::DocumentItem;
use crate::scrapers::listing::{ItemStub, ListingConfig, ListingPage};
use crate::scrapers::pagination::{AbortReason, PaginationStateMachine, StepDecision};
use crate::scrapers::{extract_title_from_url, PageFetcher};
use crate::services::ingest::IngestService;

/// How many times a transiently failing store write is retried.
const STORE_RETRIES: u32 = 2;

/// Fallback content type when the server omits one and sniffing fails.
const DEFAULT_CONTENT_TYPE: &str = "application/pdf";

/// Crawl session parameters.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub start_url: String,
    pub listing: ListingConfig,
    pub empty_page_threshold: u32,
    pub repeat_threshold: u32,
    /// Advisory taxonomy path recorded on ingested rows.
    pub path: Option<String>,
    /// Stop after this many listing pages.
    pub max_pages: Option<u32>,
    /// Concurrent detail downloads.
    pub detail_workers: usize,
}

/// Terminal outcome of a crawl session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// The listing ran out of results.
    Exhausted,
    /// The loop guard fired: the listing was stuck on one display window.
    Aborted { start: u64, end: u64 },
    /// The stop signal or the page limit ended the crawl early.
    Stopped,
}

/// Summary of one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub outcome: CrawlOutcome,
    pub pages: u32,
    pub items_seen: u64,
    pub saved: u64,
    pub errors: u64,
}

/// Wires page fetches into the state machine and completed records into the
/// ingest pipeline.
pub struct CrawlService {
    fetcher: Arc<dyn PageFetcher>,
    ingest: Arc<IngestService>,
    options: CrawlOptions,
    download_slots: Arc<Semaphore>,
}

impl CrawlService {
    /// Create a new crawl service.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        ingest: Arc<IngestService>,
        options: CrawlOptions,
    ) -> Self {
        let download_slots = Arc::new(Semaphore::new(options.detail_workers.max(1)));
        Self {
            fetcher,
            ingest,
            options,
            download_slots,
        }
    }

    /// Drive the listing to a terminal state.
    ///
    /// The stop signal is checked between page-fetch steps; mid-flight
    /// detail downloads drain rather than being interrupted.
    pub async fn run(&self, stop: Arc<AtomicBool>) -> anyhow::Result<CrawlReport> {
        let mut machine = PaginationStateMachine::with_thresholds(
            self.options.empty_page_threshold,
            self.options.repeat_threshold,
        );
        let mut downloads: JoinSet<()> = JoinSet::new();
        let mut pages = 0u32;
        let mut items_seen = 0u64;

        machine.begin_fetch();
        let mut page = self.fetcher.fetch_page(&self.options.start_url).await?;

        let outcome = loop {
            pages += 1;
            let listing = ListingPage::parse(&page.html, &page.url, &self.options.listing);
            let step = machine.observe(&listing);

            items_seen += step.items.len() as u64;
            for stub in step.items {
                self.spawn_download(&mut downloads, stub, listing.url.clone());
            }
            // Reap already-finished downloads so the set stays small.
            while downloads.try_join_next().is_some() {}

            match step.decision {
                StepDecision::Continue(request) => {
                    if stop.load(Ordering::SeqCst) {
                        info!("Stop requested; ending crawl after {} pages", pages);
                        break CrawlOutcome::Stopped;
                    }
                    if let Some(max) = self.options.max_pages {
                        if pages >= max {
                            info!("Reached page limit {}", max);
                            break CrawlOutcome::Stopped;
                        }
                    }

                    machine.begin_fetch();
                    page = self.fetcher.submit_postback(&listing.url, &request).await?;
                }
                StepDecision::Exhausted(reason) => {
                    info!("Crawl exhausted after {} pages ({:?})", pages, reason);
                    break CrawlOutcome::Exhausted;
                }
                StepDecision::Aborted(AbortReason::RepeatedRange { start, end, .. }) => {
                    break CrawlOutcome::Aborted { start, end };
                }
            }
        };

        while downloads.join_next().await.is_some() {}

        let stats = self.ingest.stats();
        let report = CrawlReport {
            outcome,
            pages,
            items_seen,
            saved: stats.saved_items(),
            errors: stats.save_errors(),
        };
        info!(
            "Crawl finished: {} pages, {} items, {} saved, {} save errors",
            report.pages, report.items_seen, report.saved, report.errors
        );
        Ok(report)
    }

    fn spawn_download(&self, downloads: &mut JoinSet<()>, stub: ItemStub, listing_url: String) {
        let fetcher = self.fetcher.clone();
        let ingest = self.ingest.clone();
        let path = self.options.path.clone();
        let slots = self.download_slots.clone();

        downloads.spawn(async move {
            let Ok(_permit) = slots.acquire_owned().await else {
                return;
            };
            if let Err(e) = download_and_ingest(fetcher, ingest, stub, listing_url, path).await {
                warn!("{:#}", e);
            }
        });
    }
}

/// Download one item, assemble its record, and run it through the pipeline.
///
/// Per-record failures never abort the crawl: everything here ends in a log
/// line at worst.
async fn download_and_ingest(
    fetcher: Arc<dyn PageFetcher>,
    ingest: Arc<IngestService>,
    stub: ItemStub,
    listing_url: String,
    path: Option<String>,
) -> anyhow::Result<()> {
    let body = fetcher
        .fetch_bytes(&stub.detail_url, Some(&listing_url))
        .await?;

    let content_type = body
        .content_type
        .clone()
        .or_else(|| infer::get(&body.bytes).map(|kind| kind.mime_type().to_string()))
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    if content_type.starts_with("text/html") {
        warn!("HTML instead of a file at {}; skipping", body.url);
        return Ok(());
    }

    let name = if stub.title.trim().is_empty() {
        extract_title_from_url(&stub.detail_url)
    } else {
        stub.title
    };

    let digest = digest_hex(&body.bytes);
    let identity = IdentitySource::Text(digest.clone());
    let item = DocumentItem {
        url: body.url.clone(),
        name,
        path,
        scraper: None,
        version: None,
        timestamp: Some(Utc::now()),
        data: json!({ "sha256": digest, "listing_page": listing_url }),
        content_type,
        blob: Some(body.bytes),
        identity: Some(identity),
    };

    let mut attempt = 0;
    loop {
        match ingest.process_item(&item).await {
            Ok(_) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < STORE_RETRIES => {
                attempt += 1;
                warn!(
                    "Retrying ({}/{}) after store error: {}",
                    attempt, STORE_RETRIES, e
                );
            }
            Err(e) => {
                warn!("{}", e);
                return Ok(());
            }
        }
    }
}
