//! `wto crawl` - drive the listing and ingest discovered documents.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Settings;
use crate::repository::migrations::run_migrations;
use crate::repository::{AsyncSqlitePool, DocumentRepository};
use crate::scrapers::HttpClient;
use crate::services::crawl::{CrawlOptions, CrawlOutcome, CrawlService};
use crate::services::ingest::{DedupPolicy, IngestService};

pub async fn run(
    settings: &Settings,
    database_url: &str,
    start_url: Option<String>,
    max_pages: Option<u32>,
    dedup_by: Option<DedupPolicy>,
) -> anyhow::Result<()> {
    // Idempotent schema bootstrap: first runs work without a separate init.
    run_migrations(database_url).await?;

    let crawl = &settings.crawl;
    let repo = DocumentRepository::new(AsyncSqlitePool::new(database_url));
    let ingest = Arc::new(IngestService::new(
        repo,
        &crawl.scraper,
        dedup_by.unwrap_or(crawl.dedup_by),
    ));

    let fetcher = Arc::new(HttpClient::new(
        Duration::from_secs(crawl.request_timeout_secs),
        Duration::from_millis(crawl.request_delay_ms),
    ));

    let options = CrawlOptions {
        start_url: start_url.unwrap_or_else(|| crawl.start_url.clone()),
        listing: settings.listing.clone(),
        empty_page_threshold: crawl.empty_page_threshold,
        repeat_threshold: crawl.repeat_threshold,
        path: crawl.path.clone(),
        max_pages,
        detail_workers: crawl.detail_workers,
    };

    // Ctrl-C requests a stop between page-fetch steps; in-flight downloads
    // drain before the report prints.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let progress = ProgressBar::new_spinner();
    progress.set_style(ProgressStyle::with_template("{spinner} {msg}").expect("progress template"));
    progress.enable_steady_tick(Duration::from_millis(120));
    progress.set_message("crawling...");

    let service = CrawlService::new(fetcher, ingest, options);
    let result = service.run(stop).await;
    progress.finish_and_clear();
    let report = result?;

    println!(
        "{} pages, {} items, {} saved, {} save errors",
        report.pages, report.items_seen, report.saved, report.errors
    );

    if let CrawlOutcome::Aborted { start, end } = report.outcome {
        bail!("crawl aborted: listing stuck on rows {start}-{end}; the postback target is not advancing");
    }
    Ok(())
}
