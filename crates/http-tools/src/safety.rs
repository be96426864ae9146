//! Redaction helpers for outbound URLs.
//!
//! Tool call failures are returned verbatim to the calling agent and written to logs. A query
//! string may carry an api key (query-located auth), so URLs are redacted before they leave
//! this crate.

use url::Url;

/// Drop credentials, query and fragment from a URL.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

/// Render a `reqwest` error with its URL redacted.
#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}
