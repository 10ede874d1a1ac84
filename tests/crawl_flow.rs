//! End-to-end crawl flow against a scripted transport.
//!
//! Fakes the page fetcher with a recorded page sequence so the whole path
//! from listing HTML to database rows runs without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use wtoacquire::identity::derive_identity;
use wtoacquire::repository::migrations::run_migrations;
use wtoacquire::repository::{AsyncSqlitePool, DocumentRepository};
use wtoacquire::scrapers::listing::ListingConfig;
use wtoacquire::scrapers::{FetchedBody, FetchedPage, PageFetcher, PostbackRequest};
use wtoacquire::services::crawl::{CrawlOptions, CrawlOutcome, CrawlService};
use wtoacquire::services::ingest::{DedupPolicy, IngestService};

const LISTING_URL: &str = "https://docs.wto.org/dol2fe/Pages/FE_Search/FE_S_S006.aspx";

/// Serves a fixed page sequence and records every postback it receives.
struct ScriptedFetcher {
    pages: Mutex<VecDeque<String>>,
    postbacks: Mutex<Vec<PostbackRequest>>,
    bodies: HashMap<String, (&'static str, Vec<u8>)>,
}

impl ScriptedFetcher {
    fn new(pages: Vec<String>, bodies: HashMap<String, (&'static str, Vec<u8>)>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            postbacks: Mutex::new(Vec::new()),
            bodies,
        }
    }

    fn next_page(&self) -> anyhow::Result<String> {
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("fetched past the scripted page sequence"))
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(&self, url: &str) -> anyhow::Result<FetchedPage> {
        Ok(FetchedPage {
            url: url.to_string(),
            html: self.next_page()?,
        })
    }

    async fn submit_postback(
        &self,
        page_url: &str,
        request: &PostbackRequest,
    ) -> anyhow::Result<FetchedPage> {
        self.postbacks.lock().unwrap().push(request.clone());
        Ok(FetchedPage {
            url: page_url.to_string(),
            html: self.next_page()?,
        })
    }

    async fn fetch_bytes(&self, url: &str, _referer: Option<&str>) -> anyhow::Result<FetchedBody> {
        let (content_type, bytes) = self
            .bodies
            .get(url)
            .ok_or_else(|| anyhow::anyhow!("no scripted body for {url}"))?;
        Ok(FetchedBody {
            url: url.to_string(),
            content_type: Some(content_type.to_string()),
            bytes: bytes.clone(),
        })
    }
}

fn listing_html(
    view_state: &str,
    items: &[(&str, &str)],
    range: &str,
    next_disabled: bool,
) -> String {
    let rows: String = items
        .iter()
        .map(|(title, href)| {
            format!(
                r#"<tr><td><a class="FEFileNameLinkResultsCss" href="{href}">{title}</a></td></tr>"#
            )
        })
        .collect();
    let next_class = if next_disabled { "aspNetDisabled" } else { "" };

    format!(
        r##"<html><body>
        <form id="aspnetForm" action="FE_S_S006.aspx" method="post">
        <input type="hidden" id="__VIEWSTATE" value="{view_state}" />
        <input type="hidden" id="__VIEWSTATEGENERATOR" value="CA0B0334" />
        <input type="hidden" id="__EVENTVALIDATION" value="EV-{view_state}" />
        <span id="ctl00_MainPlaceHolder_lblResultRange">{range}</span>
        <table id="ctl00_MainPlaceHolder_dtlDocs">{rows}</table>
        <a id="ctl00_MainPlaceHolder_lnkNext" class="{next_class}"
           href="javascript:__doPostBack('ctl00$MainPlaceHolder$lnkNext','')">Next</a>
        </form></body></html>"##
    )
}

struct Harness {
    _dir: tempfile::TempDir,
    repo: DocumentRepository,
    ingest: Arc<IngestService>,
}

async fn harness(dedup: DedupPolicy) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let url = dir.path().join("crawl.db").display().to_string();
    run_migrations(&url).await.unwrap();
    let repo = DocumentRepository::new(AsyncSqlitePool::new(&url));
    let ingest = Arc::new(IngestService::new(repo.clone(), "wto_docs", dedup));
    Harness {
        _dir: dir,
        repo,
        ingest,
    }
}

fn options() -> CrawlOptions {
    CrawlOptions {
        start_url: LISTING_URL.to_string(),
        listing: ListingConfig::default(),
        empty_page_threshold: 2,
        repeat_threshold: 3,
        path: Some("wto.docs.decisions".to_string()),
        max_pages: None,
        detail_workers: 2,
    }
}

#[tokio::test]
async fn test_crawl_two_pages_and_ingest_all_documents() {
    let harness = harness(DedupPolicy::Url).await;

    let pages = vec![
        listing_html(
            "VS1",
            &[
                ("WT/DS/1", "/Docs/decision_1.pdf"),
                ("WT/DS/2", "/Docs/decision_2.pdf"),
            ],
            "Documents 1 - 2 of 3",
            false,
        ),
        listing_html(
            "VS2",
            &[("WT/DS/3", "/Docs/decision_3.pdf")],
            "Documents 3 - 3 of 3",
            true,
        ),
    ];

    let mut bodies = HashMap::new();
    for n in 1..=3 {
        bodies.insert(
            format!("https://docs.wto.org/Docs/decision_{n}.pdf"),
            ("application/pdf", format!("%PDF-1.4 decision {n}").into_bytes()),
        );
    }

    let fetcher = Arc::new(ScriptedFetcher::new(pages, bodies));
    let service = CrawlService::new(fetcher.clone(), harness.ingest.clone(), options());

    let report = service
        .run(Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Exhausted);
    assert_eq!(report.pages, 2);
    assert_eq!(report.items_seen, 3);
    assert_eq!(report.saved, 3);
    assert_eq!(report.errors, 0);

    assert_eq!(harness.repo.count().await.unwrap(), 3);
    assert_eq!(harness.repo.blob_count().await.unwrap(), 3);

    // Exactly one postback advanced the listing, carrying page 1's tokens
    // verbatim.
    let postbacks = fetcher.postbacks.lock().unwrap();
    assert_eq!(postbacks.len(), 1);
    assert_eq!(postbacks[0].target, "ctl00$MainPlaceHolder$lnkNext");
    assert_eq!(postbacks[0].tokens.view_state, "VS1");
    assert_eq!(postbacks[0].tokens.event_validation, "EV-VS1");

    // Content-addressed identity: the stored row is keyed by the digest of
    // its bytes.
    let id = derive_identity(b"%PDF-1.4 decision 1").to_string();
    let doc = harness.repo.get(&id).await.unwrap().unwrap();
    assert_eq!(doc.name, "WT/DS/1");
    assert_eq!(doc.url, "https://docs.wto.org/Docs/decision_1.pdf");
    assert_eq!(doc.path.as_deref(), Some("wto.docs.decisions"));
    assert_eq!(doc.scraper, "wto_docs");
    assert_eq!(doc.version, "1.0");
    assert_eq!(
        doc.data["sha256"].as_str().unwrap(),
        wtoacquire::identity::digest_hex(b"%PDF-1.4 decision 1")
    );
}

#[tokio::test]
async fn test_crawl_aborts_on_stuck_listing() {
    let harness = harness(DedupPolicy::Url).await;

    // Page 1 advances; the postback then re-serves the same window forever.
    let stuck = || {
        listing_html(
            "VS-stuck",
            &[("WT/DS/9", "/Docs/decision_9.pdf")],
            "Documents 21 - 40 of 137",
            false,
        )
    };
    let pages = vec![
        listing_html(
            "VS1",
            &[("WT/DS/8", "/Docs/decision_8.pdf")],
            "Documents 1 - 20 of 137",
            false,
        ),
        stuck(),
        stuck(),
        stuck(),
    ];

    let mut bodies = HashMap::new();
    for n in [8, 9] {
        bodies.insert(
            format!("https://docs.wto.org/Docs/decision_{n}.pdf"),
            ("application/pdf", format!("%PDF-1.4 decision {n}").into_bytes()),
        );
    }

    let fetcher = Arc::new(ScriptedFetcher::new(pages, bodies));
    let service = CrawlService::new(fetcher.clone(), harness.ingest.clone(), options());

    let report = service
        .run(Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    // Aborted exactly at the third identical window; the scripted queue is
    // now empty, proving no further fetch was attempted.
    assert_eq!(report.outcome, CrawlOutcome::Aborted { start: 21, end: 40 });
    assert_eq!(report.pages, 4);
    assert!(fetcher.pages.lock().unwrap().is_empty());

    // Documents seen along the way still ingested; the same URL repeated on
    // the stuck pages collapsed into one row.
    assert_eq!(harness.repo.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_html_detail_response_is_skipped() {
    let harness = harness(DedupPolicy::Url).await;

    let pages = vec![listing_html(
        "VS1",
        &[
            ("WT/DS/1", "/Docs/decision_1.pdf"),
            ("Interstitial", "/Docs/login_wall.pdf"),
        ],
        "Documents 1 - 2 of 2",
        true,
    )];

    let mut bodies = HashMap::new();
    bodies.insert(
        "https://docs.wto.org/Docs/decision_1.pdf".to_string(),
        ("application/pdf", b"%PDF-1.4 ok".to_vec()),
    );
    bodies.insert(
        "https://docs.wto.org/Docs/login_wall.pdf".to_string(),
        ("text/html; charset=utf-8", b"<html>session expired</html>".to_vec()),
    );

    let fetcher = Arc::new(ScriptedFetcher::new(pages, bodies));
    let service = CrawlService::new(fetcher, harness.ingest.clone(), options());

    let report = service
        .run(Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Exhausted);
    assert_eq!(report.items_seen, 2);
    assert_eq!(report.saved, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(harness.repo.count().await.unwrap(), 1);
}
