//! Static API-key authentication for outbound tool calls.
//!
//! A tool captures exactly one [`AuthConfig`] when it is registered. The config is applied once
//! per call, after the declared path/query/header parameters have been bound, so an auth
//! parameter is layered on top of (and wins over) a same-named declared header.

use crate::error::{HttpToolsError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

/// `authType` value that marks a persisted record as API-key auth.
pub const API_KEY_AUTH_TYPE: &str = "API Key";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

impl ApiKeyLocation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ApiKeyLocation::Header => "header",
            ApiKeyLocation::Query => "query",
        }
    }
}

/// Outbound authentication for one tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthConfig {
    #[default]
    None,
    ApiKey {
        #[serde(rename = "in", default)]
        location: ApiKeyLocation,
        name: String,
        value: String,
    },
}

impl AuthConfig {
    #[must_use]
    pub fn api_key_header(name: impl Into<String>, value: impl Into<String>) -> Self {
        AuthConfig::ApiKey {
            location: ApiKeyLocation::Header,
            name: name.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn api_key_query(name: impl Into<String>, value: impl Into<String>) -> Self {
        AuthConfig::ApiKey {
            location: ApiKeyLocation::Query,
            name: name.into(),
            value: value.into(),
        }
    }

    /// Check the api-key invariants (non-empty name and value, valid header token).
    ///
    /// # Errors
    ///
    /// Returns [`HttpToolsError::Config`] if the config can never produce a valid request.
    pub fn validate(&self) -> Result<()> {
        let AuthConfig::ApiKey {
            location,
            name,
            value,
        } = self
        else {
            return Ok(());
        };

        if name.trim().is_empty() {
            return Err(HttpToolsError::Config(
                "api key auth requires a non-empty parameter name".to_string(),
            ));
        }
        if value.is_empty() {
            return Err(HttpToolsError::Config(format!(
                "api key auth '{name}' requires a non-empty value"
            )));
        }
        if *location == ApiKeyLocation::Header {
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                HttpToolsError::Config(format!("invalid api key header name '{name}': {e}"))
            })?;
            HeaderValue::from_str(value).map_err(|e| {
                HttpToolsError::Config(format!("invalid api key header value for '{name}': {e}"))
            })?;
        }
        Ok(())
    }

    /// Append `name=value` to the query string when the key travels in the query.
    pub fn apply_to_url(&self, url: &mut Url) {
        if let AuthConfig::ApiKey {
            location: ApiKeyLocation::Query,
            name,
            value,
        } = self
        {
            url.query_pairs_mut().append_pair(name, value);
        }
    }

    /// Set the auth header when the key travels in a header.
    ///
    /// # Errors
    ///
    /// Returns [`HttpToolsError::Request`] if the name or value is not a valid header token.
    pub fn apply_to_headers(&self, headers: &mut HeaderMap) -> Result<()> {
        if let AuthConfig::ApiKey {
            location: ApiKeyLocation::Header,
            name,
            value,
        } = self
        {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| HttpToolsError::Request(format!("invalid auth header name: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| HttpToolsError::Request(format!("invalid auth header value: {e}")))?;
            headers.insert(name, value);
        }
        Ok(())
    }
}

/// Persisted form of [`AuthConfig`], as stored next to each tool record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAuthRecord {
    #[serde(default)]
    pub auth_type: String,
    #[serde(default)]
    pub auth_in: String,
    #[serde(default)]
    pub auth_name: String,
    #[serde(default)]
    pub auth_value: String,
}

impl From<&AuthConfig> for ApiAuthRecord {
    fn from(auth: &AuthConfig) -> Self {
        match auth {
            AuthConfig::None => ApiAuthRecord::default(),
            AuthConfig::ApiKey {
                location,
                name,
                value,
            } => ApiAuthRecord {
                auth_type: API_KEY_AUTH_TYPE.to_string(),
                auth_in: location.as_str().to_string(),
                auth_name: name.clone(),
                auth_value: value.clone(),
            },
        }
    }
}

impl TryFrom<&ApiAuthRecord> for AuthConfig {
    type Error = HttpToolsError;

    fn try_from(record: &ApiAuthRecord) -> Result<Self> {
        if record.auth_type != API_KEY_AUTH_TYPE {
            return Ok(AuthConfig::None);
        }
        let location = match record.auth_in.to_ascii_lowercase().as_str() {
            "" | "header" => ApiKeyLocation::Header,
            "query" => ApiKeyLocation::Query,
            other => {
                return Err(HttpToolsError::Config(format!(
                    "unsupported api key location '{other}'"
                )));
            }
        };
        Ok(AuthConfig::ApiKey {
            location,
            name: record.auth_name.clone(),
            value: record.auth_value.clone(),
        })
    }
}
