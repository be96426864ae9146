//! Error types for the bridge.

use mcp_bridge_http_tools::error::HttpToolsError;
use mcp_bridge_openapi::OpenApiToolsError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Machine-readable error keys returned to HTTP callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKey {
    McpServerNotExist,
    McpServerStartErr,
    McpServerShutdownErr,
    McpServerRegisterToolErr,
    McpServerUnregisterToolErr,
    McpServerConvertToolErr,
    McpServerToolTypeUnknown,
    McpServerToolNotExist,
    McpServerCustomToolNotExist,
    McpServerConfigErr,
    McpServerStoreErr,
    /// SSE message POST without a usable `sessionId`.
    McpSessionNotExist,
}

impl ErrorKey {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKey::McpServerNotExist => "mcp_server_not_exist",
            ErrorKey::McpServerStartErr => "mcp_server_start_err",
            ErrorKey::McpServerShutdownErr => "mcp_server_shutdown_err",
            ErrorKey::McpServerRegisterToolErr => "mcp_server_register_tool_err",
            ErrorKey::McpServerUnregisterToolErr => "mcp_server_unregister_tool_err",
            ErrorKey::McpServerConvertToolErr => "mcp_server_convert_tool_err",
            ErrorKey::McpServerToolTypeUnknown => "mcp_server_tool_type_unknown",
            ErrorKey::McpServerToolNotExist => "mcp_server_tool_not_exist",
            ErrorKey::McpServerCustomToolNotExist => "mcp_server_custom_tool_not_exist",
            ErrorKey::McpServerConfigErr => "mcp_server_config_err",
            ErrorKey::McpServerStoreErr => "mcp_server_store_err",
            ErrorKey::McpSessionNotExist => "mcp_session_not_exist",
        }
    }
}

impl fmt::Display for ErrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry state violations. The registry is left unchanged when one is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool server '{0}' already exists")]
    AlreadyExists(String),

    #[error("tool server '{0}' does not exist")]
    NotFound(String),

    #[error("tool server '{server_id}' already has a tool named '{tool}'")]
    ToolNameTaken { server_id: String, tool: String },
}

/// Main error type for the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A registry operation failed; `key` names the operation that was attempted.
    #[error("{key}: {source}")]
    Registry {
        key: ErrorKey,
        #[source]
        source: RegistryError,
    },

    /// A tool definition could not be turned into a callable.
    #[error("failed to convert tool: {0}")]
    Convert(#[from] OpenApiToolsError),

    #[error("unknown tool type '{0}'")]
    UnknownToolType(String),

    #[error("custom tool '{0}' does not exist")]
    CustomToolNotFound(String),

    #[error("tool record '{0}' does not exist")]
    ToolNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<HttpToolsError> for BridgeError {
    fn from(value: HttpToolsError) -> Self {
        Self::Convert(OpenApiToolsError::Http(value))
    }
}

impl BridgeError {
    #[must_use]
    pub fn registry(key: ErrorKey, source: RegistryError) -> Self {
        Self::Registry { key, source }
    }

    /// A missing server is always reported as `mcp_server_not_exist`, whichever operation
    /// tripped over it.
    #[must_use]
    pub fn key(&self) -> ErrorKey {
        match self {
            BridgeError::Registry {
                source: RegistryError::NotFound(_),
                ..
            } => ErrorKey::McpServerNotExist,
            BridgeError::Registry { key, .. } => *key,
            BridgeError::Convert(_) => ErrorKey::McpServerConvertToolErr,
            BridgeError::UnknownToolType(_) => ErrorKey::McpServerToolTypeUnknown,
            BridgeError::CustomToolNotFound(_) => ErrorKey::McpServerCustomToolNotExist,
            BridgeError::ToolNotFound(_) => ErrorKey::McpServerToolNotExist,
            BridgeError::Config(_) | BridgeError::Yaml(_) => ErrorKey::McpServerConfigErr,
            BridgeError::Store(_) | BridgeError::Io(_) | BridgeError::Json(_) => {
                ErrorKey::McpServerStoreErr
            }
        }
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_serialize_as_snake_case_strings() {
        for key in [
            ErrorKey::McpServerNotExist,
            ErrorKey::McpServerRegisterToolErr,
            ErrorKey::McpServerCustomToolNotExist,
            ErrorKey::McpSessionNotExist,
        ] {
            let v = serde_json::to_value(key).expect("serialize");
            assert_eq!(v.as_str(), Some(key.as_str()));
        }
    }

    #[test]
    fn missing_server_maps_to_not_exist_for_every_operation() {
        let err = BridgeError::registry(
            ErrorKey::McpServerRegisterToolErr,
            RegistryError::NotFound("s1".to_string()),
        );
        assert_eq!(err.key(), ErrorKey::McpServerNotExist);

        let err = BridgeError::registry(
            ErrorKey::McpServerStartErr,
            RegistryError::AlreadyExists("s1".to_string()),
        );
        assert_eq!(err.key(), ErrorKey::McpServerStartErr);
        assert_eq!(
            err.to_string(),
            "mcp_server_start_err: tool server 's1' already exists"
        );
    }
}
