//! Cookie-preserving HTTP transport.
//!
//! One client instance carries one logical session. The WebForms listing
//! only honors postbacks from the session that rendered the page, so the
//! cookie jar is shared across every request of a crawl.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::postback::PostbackRequest;
use super::{FetchedBody, FetchedPage, PageFetcher};

/// Default User-Agent for outgoing requests.
pub const USER_AGENT: &str = "wtoacquire/0.4";

/// HTTP client with session cookies and a fixed politeness delay.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    request_delay: Duration,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(timeout: Duration, request_delay: Duration) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            request_delay,
        }
    }

    async fn pace(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch_page(&self, url: &str) -> anyhow::Result<FetchedPage> {
        self.pace().await;
        debug!("GET {}", url);

        let response = self.client.get(url).send().await?.error_for_status()?;
        let final_url = response.url().to_string();
        let html = response.text().await?;

        Ok(FetchedPage {
            url: final_url,
            html,
        })
    }

    async fn submit_postback(
        &self,
        page_url: &str,
        request: &PostbackRequest,
    ) -> anyhow::Result<FetchedPage> {
        self.pace().await;
        debug!("POST {} target={}", page_url, request.target);

        let response = self
            .client
            .post(page_url)
            .form(&request.form_fields())
            .send()
            .await?
            .error_for_status()?;
        let final_url = response.url().to_string();
        let html = response.text().await?;

        Ok(FetchedPage {
            url: final_url,
            html,
        })
    }

    async fn fetch_bytes(&self, url: &str, referer: Option<&str>) -> anyhow::Result<FetchedBody> {
        self.pace().await;
        debug!("GET {} (binary)", url);

        let mut request = self.client.get(url);
        if let Some(referer) = referer {
            request = request.header(reqwest::header::REFERER, referer);
        }

        let response = request.send().await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let final_url = response.url().to_string();
        let bytes = response.bytes().await?.to_vec();

        Ok(FetchedBody {
            url: final_url,
            content_type,
            bytes,
        })
    }
}
