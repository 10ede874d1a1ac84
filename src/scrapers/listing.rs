//! Listing page snapshots.
//!
//! Parses one rendered results page into the bits the pagination machine
//! cares about: item stubs, the self-reported displayed range, the next
//! control, and the hidden postback tokens. Which elements carry those bits
//! is selector configuration; the defaults match WTO Documents Online.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use super::postback::{extract_postback, id_to_target, PostbackTokens};

static RANGE_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d[\d,]*)\s*(?:-|–|—|to)\s*(\d[\d,]*)(?:\s*(?:of|/)\s*(\d[\d,]*))?")
        .expect("range regex")
});

static WINDOW_OPEN_RX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"window\.open\('([^']+)'").expect("window.open regex"));

/// Selector configuration for a results listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Anchors linking each result row to its document.
    #[serde(default = "default_item_link_selector")]
    pub item_link_selector: String,
    /// The pager's "next" control.
    #[serde(default = "default_next_selector")]
    pub next_selector: String,
    /// Label reporting the displayed range, e.g. "21 - 40 of 137".
    #[serde(default = "default_range_selector")]
    pub range_selector: String,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            item_link_selector: default_item_link_selector(),
            next_selector: default_next_selector(),
            range_selector: default_range_selector(),
        }
    }
}

fn default_item_link_selector() -> String {
    "#ctl00_MainPlaceHolder_dtlDocs a.FEFileNameLinkResultsCss".to_string()
}

fn default_next_selector() -> String {
    "a#ctl00_MainPlaceHolder_lnkNext".to_string()
}

fn default_range_selector() -> String {
    "#ctl00_MainPlaceHolder_lblResultRange".to_string()
}

/// One result row: display title plus resolved detail URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStub {
    pub title: String,
    pub detail_url: String,
}

/// The pager's self-reported display window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayedRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

/// The pager's "next" control as rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextControl {
    pub target: String,
    pub argument: String,
    pub enabled: bool,
}

/// Everything the pagination machine needs from one rendered page.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub url: String,
    pub items: Vec<ItemStub>,
    pub range: Option<DisplayedRange>,
    pub next: Option<NextControl>,
    pub tokens: PostbackTokens,
}

impl ListingPage {
    /// Parse one rendered page.
    pub fn parse(html: &str, url: &str, config: &ListingConfig) -> Self {
        let document = Html::parse_document(html);

        let tokens = PostbackTokens {
            view_state: hidden_value(&document, "__VIEWSTATE"),
            view_state_generator: hidden_value(&document, "__VIEWSTATEGENERATOR"),
            event_validation: hidden_value(&document, "__EVENTVALIDATION"),
        };

        let items = extract_items(&document, url, &config.item_link_selector);
        let range = extract_range(&document, &config.range_selector);
        let next = extract_next(&document, &config.next_selector);

        Self {
            url: url.to_string(),
            items,
            range,
            next,
            tokens,
        }
    }
}

fn hidden_value(document: &Html, id: &str) -> String {
    let selector = match Selector::parse(&format!("input#{id}")) {
        Ok(s) => s,
        Err(_) => return String::new(),
    };

    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("value"))
        .unwrap_or("")
        .to_string()
}

fn extract_items(document: &Html, page_url: &str, selector_str: &str) -> Vec<ItemStub> {
    let selector = match Selector::parse(selector_str) {
        Ok(s) => s,
        Err(_) => {
            warn!("Invalid item link selector: {}", selector_str);
            return Vec::new();
        }
    };

    let mut items = Vec::new();
    for element in document.select(&selector) {
        let title = element.text().collect::<String>().trim().to_string();

        let resolved = [element.value().attr("href"), element.value().attr("onclick")]
            .into_iter()
            .flatten()
            .find_map(|link| resolve_detail_url(page_url, link));

        match resolved {
            Some(detail_url) => items.push(ItemStub { title, detail_url }),
            // Dropped stubs do not abort the crawl.
            None => warn!(
                "Dropping item stub {:?} without a usable detail link on {}",
                title, page_url
            ),
        }
    }
    items
}

/// Resolve an item link against the page URL, unwrapping catalogue-style
/// `window.open` handlers.
fn resolve_detail_url(page_url: &str, link: &str) -> Option<String> {
    let raw = if let Some(caps) = WINDOW_OPEN_RX.captures(link) {
        caps.get(1)?.as_str()
    } else if link.trim_start().starts_with("javascript:") {
        // Postback-only link: no addressable detail URL.
        return None;
    } else {
        link
    };

    Url::parse(page_url)
        .ok()?
        .join(raw)
        .ok()
        .map(|u| u.to_string())
}

fn extract_range(document: &Html, selector_str: &str) -> Option<DisplayedRange> {
    let selector = Selector::parse(selector_str).ok()?;
    let text = document.select(&selector).next()?.text().collect::<String>();
    parse_range(&text)
}

/// Parse a "21 - 40 of 137" style label. The total is optional; some
/// renderings only show the window.
pub fn parse_range(text: &str) -> Option<DisplayedRange> {
    let caps = RANGE_RX.captures(text)?;
    let number = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().replace(',', "").parse::<u64>().ok())
    };

    Some(DisplayedRange {
        start: number(1)?,
        end: number(2)?,
        total: number(3),
    })
}

fn extract_next(document: &Html, selector_str: &str) -> Option<NextControl> {
    let selector = Selector::parse(selector_str).ok()?;
    let element = document.select(&selector).next()?;

    let enabled = element.value().attr("disabled").is_none()
        && !element
            .value()
            .attr("class")
            .map(|c| c.split_whitespace().any(|cls| cls == "aspNetDisabled"))
            .unwrap_or(false);

    let href = element.value().attr("href").unwrap_or("");
    let onclick = element.value().attr("onclick").unwrap_or("");
    let (target, argument) = match extract_postback(href).or_else(|| extract_postback(onclick)) {
        Some(pair) => pair,
        None => {
            // No embedded postback call: derive the target from the
            // control's structural id with an empty argument.
            let id = element.value().attr("id")?;
            (id_to_target(id), String::new())
        }
    };

    Some(NextControl {
        target,
        argument,
        enabled,
    })
}
