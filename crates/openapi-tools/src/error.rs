//! Error types for `mcp-bridge-openapi`.
//!
//! Everything here is a *definition* error: it is raised while a document is parsed or a
//! callable is built, before anything is registered. Call-time failures never surface as
//! errors; they become error-flagged tool results.

use mcp_bridge_http_tools::error::HttpToolsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    #[error("OpenAPI error: failed to parse document: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("OpenAPI error: unsupported OpenAPI version '{0}' (expected 3.x)")]
    UnsupportedVersion(String),

    #[error("OpenAPI error: document declares no servers")]
    NoServers,

    #[error("OpenAPI error: invalid server url '{0}' (expected http:// or https://)")]
    InvalidServerUrl(String),

    #[error("OpenAPI error: {method} {path} has no operationId")]
    MissingOperationId { method: String, path: String },

    #[error("OpenAPI error: duplicate operationId '{0}'")]
    DuplicateOperationId(String),

    #[error("OpenAPI error: operation '{0}' not found")]
    OperationNotFound(String),

    /// `$ref` resolution failures (missing pointer, unreadable file or URL, cycles).
    #[error("OpenAPI error: {0}")]
    Resolve(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP tools error: {0}")]
    Http(#[from] HttpToolsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
