//! Error types for `mcp-bridge-http-tools`.

use crate::safety::sanitize_reqwest_error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpToolsError {
    /// Invalid auth or client configuration.
    #[error("config error: {0}")]
    Config(String),

    /// A request could not be assembled (bad URL, header name or value).
    #[error("request error: {0}")]
    Request(String),

    /// Transport-level failure (connect, TLS, timeout, body read).
    #[error("http transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, HttpToolsError>;

impl From<reqwest::Error> for HttpToolsError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(sanitize_reqwest_error(&value))
    }
}
