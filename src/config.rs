//! Configuration management.
//!
//! Settings load from a TOML file (`wtoacquire.toml`) with serde defaults
//! for every field, so an empty or missing file is a valid configuration.
//! The database location can be overridden with `--database` or the
//! `DATABASE_URL` environment variable.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::scrapers::listing::ListingConfig;
use crate::scrapers::pagination::{DEFAULT_EMPTY_PAGE_THRESHOLD, DEFAULT_REPEAT_THRESHOLD};
use crate::services::ingest::DedupPolicy;

/// Default results listing: WTO Documents Online decision search.
pub const DEFAULT_START_URL: &str = "https://docs.wto.org/dol2fe/Pages/FE_Search/FE_S_S006.aspx?MetaCollection=WTO&TypeList=%22Decision%22&Language=ENGLISH&SearchPage=FE_S_S001&languageUIChanged=true";

pub const DEFAULT_CONFIG_FILE: &str = "wtoacquire.toml";
pub const DEFAULT_DB_FILE: &str = "wtoacquire.db";

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub crawl: CrawlSettings,
    #[serde(default)]
    pub listing: ListingConfig,
}

/// Database location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite database path; created by `wto init`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl DatabaseSettings {
    /// Resolve the effective database URL.
    ///
    /// Priority: CLI override, `DATABASE_URL`, configured path, then the
    /// platform data directory.
    pub fn resolve_url(&self, cli_override: Option<&Path>) -> String {
        if let Some(path) = cli_override {
            return path.display().to_string();
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                return url;
            }
        }
        if let Some(ref path) = self.path {
            return path.display().to_string();
        }
        default_data_dir().join(DEFAULT_DB_FILE).display().to_string()
    }
}

/// Default data directory (platform data dir + `wtoacquire`).
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wtoacquire")
}

/// Crawl behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Listing URL the crawl starts from.
    #[serde(default = "default_start_url")]
    pub start_url: String,
    /// Scraper name recorded on ingested rows.
    #[serde(default = "default_scraper_name")]
    pub scraper: String,
    /// Advisory taxonomy path recorded on ingested rows.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub dedup_by: DedupPolicy,
    #[serde(default = "default_empty_page_threshold")]
    pub empty_page_threshold: u32,
    #[serde(default = "default_repeat_threshold")]
    pub repeat_threshold: u32,
    /// Concurrent detail downloads per listing page.
    #[serde(default = "default_detail_workers")]
    pub detail_workers: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            start_url: default_start_url(),
            scraper: default_scraper_name(),
            path: None,
            dedup_by: DedupPolicy::default(),
            empty_page_threshold: default_empty_page_threshold(),
            repeat_threshold: default_repeat_threshold(),
            detail_workers: default_detail_workers(),
            request_timeout_secs: default_request_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
        }
    }
}

fn default_start_url() -> String {
    DEFAULT_START_URL.to_string()
}

fn default_scraper_name() -> String {
    "wto_docs".to_string()
}

fn default_empty_page_threshold() -> u32 {
    DEFAULT_EMPTY_PAGE_THRESHOLD
}

fn default_repeat_threshold() -> u32 {
    DEFAULT_REPEAT_THRESHOLD
}

fn default_detail_workers() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_request_delay_ms() -> u64 {
    500
}

/// Load settings from an explicit file, `wtoacquire.toml` in the working
/// directory, or defaults when neither exists.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let path = match config_path {
        Some(p) => Some(p.to_path_buf()),
        None => {
            let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
            candidate.exists().then_some(candidate)
        }
    };

    match path {
        Some(p) => {
            let raw = fs::read_to_string(&p)
                .with_context(|| format!("reading config file {}", p.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing {}", p.display()))
        }
        None => Ok(Settings::default()),
    }
}
