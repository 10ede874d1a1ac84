//! ASP.NET WebForms postback protocol helpers.
//!
//! A postback is a form submission naming the server-side control that was
//! activated. The hidden per-page tokens must be echoed back verbatim on the
//! next submission or the server rejects it.

use std::sync::LazyLock;

use regex::Regex;

static DO_POSTBACK_RX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__doPostBack\('([^']*)','([^']*)'").expect("postback regex"));

/// Hidden state tokens scraped from one rendered page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostbackTokens {
    pub view_state: String,
    pub view_state_generator: String,
    pub event_validation: String,
}

/// One outbound postback: target/argument plus the tokens of the page it is
/// issued against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostbackRequest {
    pub target: String,
    pub argument: String,
    pub tokens: PostbackTokens,
}

impl PostbackRequest {
    /// Form-encoded fields for submission, tokens carried forward verbatim.
    pub fn form_fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("__EVENTTARGET", self.target.as_str()),
            ("__EVENTARGUMENT", self.argument.as_str()),
            ("__VIEWSTATE", self.tokens.view_state.as_str()),
            (
                "__VIEWSTATEGENERATOR",
                self.tokens.view_state_generator.as_str(),
            ),
            ("__EVENTVALIDATION", self.tokens.event_validation.as_str()),
        ]
    }
}

/// Extract the target/argument pair from an embedded `__doPostBack` call.
pub fn extract_postback(js: &str) -> Option<(String, String)> {
    DO_POSTBACK_RX
        .captures(js)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
}

/// Derive a postback target from a control's structural id.
///
/// WebForms renders hierarchical ids with `_` separators where the postback
/// naming convention uses `$`.
pub fn id_to_target(html_id: &str) -> String {
    html_id.replace('_', "$")
}
