//! Scraping layer: postback protocol, listing snapshots, pagination.

pub mod http_client;
pub mod listing;
pub mod pagination;
pub mod postback;

pub use http_client::HttpClient;
pub use listing::{DisplayedRange, ItemStub, ListingConfig, ListingPage, NextControl};
pub use pagination::{PaginationState, PaginationStateMachine};
pub use postback::{PostbackRequest, PostbackTokens};

use async_trait::async_trait;

/// A fetched page: final URL plus rendered HTML.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub html: String,
}

/// A fetched binary body.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub url: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Transport collaborator issuing requests on behalf of a crawl.
///
/// The listing session is stateful server-side: implementations must keep
/// cookie continuity across calls belonging to one crawl, and callers must
/// never overlap postbacks against the same session.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a page by URL.
    async fn fetch_page(&self, url: &str) -> anyhow::Result<FetchedPage>;

    /// Submit a postback against the page at `page_url`, reproducing its
    /// hidden state tokens verbatim.
    async fn submit_postback(
        &self,
        page_url: &str,
        request: &PostbackRequest,
    ) -> anyhow::Result<FetchedPage>;

    /// Fetch a binary document body.
    async fn fetch_bytes(&self, url: &str, referer: Option<&str>) -> anyhow::Result<FetchedBody>;
}

/// Extract a document title from its URL.
pub fn extract_title_from_url(url: &str) -> String {
    let path = url.split('/').next_back().unwrap_or("untitled");
    let name = path
        .trim_end_matches(".pdf")
        .trim_end_matches(".PDF")
        .trim_end_matches(".doc")
        .trim_end_matches(".docx");
    name.replace(['_', '-'], " ")
}
