//! MCP tool annotations derived from HTTP method semantics (RFC 9110).

use reqwest::Method;
use rmcp::model::ToolAnnotations;

/// `(read_only, destructive, idempotent)` hints for a method; `None` leaves a hint unset.
fn method_hints(method: &Method) -> (Option<bool>, Option<bool>, Option<bool>) {
    match *method {
        Method::GET | Method::HEAD | Method::OPTIONS => (Some(true), Some(false), Some(true)),
        Method::POST => (Some(false), Some(false), Some(false)),
        Method::PUT | Method::DELETE => (Some(false), Some(true), Some(true)),
        // PATCH may or may not be idempotent.
        Method::PATCH => (Some(false), Some(true), None),
        _ => (None, None, None),
    }
}

/// Annotations for a tool backed by one HTTP operation.
///
/// Every bridged tool talks to an external API, so `openWorldHint` is always set. `title`
/// carries the operation summary when the document has one.
#[must_use]
pub fn annotations_for_operation(method: &Method, title: Option<&str>) -> ToolAnnotations {
    let (read_only_hint, destructive_hint, idempotent_hint) = method_hints(method);
    ToolAnnotations {
        title: title.map(str::to_string),
        read_only_hint,
        destructive_hint,
        idempotent_hint,
        open_world_hint: Some(true),
    }
}
