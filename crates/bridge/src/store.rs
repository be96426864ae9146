//! Durable records of servers, their tools and the custom-tool catalog.
//!
//! The bridge talks to storage through [`BridgeStore`] and [`CustomToolLookup`]. [`MemoryStore`]
//! keeps everything in memory, loads from a YAML or JSON snapshot file and, when asked to, writes
//! every mutation back to that file.

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use mcp_bridge_http_tools::auth::ApiAuthRecord;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub server_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// One registered tool, with everything needed to rebuild its callable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRecord {
    pub id: String,
    pub server_id: String,
    /// Id of the catalog entry the tool came from (custom tool id), if any.
    #[serde(default)]
    pub app_tool_id: String,
    /// Provenance: `custom` or `openapi`.
    pub tool_type: String,
    #[serde(default)]
    pub app_tool_name: String,
    /// Operation id; also the MCP tool name.
    pub tool_name: String,
    #[serde(default)]
    pub description: String,
    /// Standalone single-operation OpenAPI document (JSON).
    pub schema: String,
    #[serde(default)]
    pub auth: ApiAuthRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomToolAuth {
    #[serde(rename = "type", default)]
    pub auth_type: String,
    #[serde(default)]
    pub custom_header_name: String,
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomToolRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub schema: String,
    #[serde(default)]
    pub auth: CustomToolAuth,
}

/// On-disk layout of the state file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default)]
    pub servers: Vec<ServerRecord>,
    #[serde(default)]
    pub tools: Vec<ToolRecord>,
    #[serde(default)]
    pub custom_tools: Vec<CustomToolRecord>,
}

impl StoreSnapshot {
    /// Parse a snapshot. JSON is tried for `.json` paths, YAML otherwise (YAML also accepts JSON).
    pub fn parse(raw: &str, path: Option<&Path>) -> Result<Self> {
        if is_json(path) {
            Ok(serde_json::from_str(raw)?)
        } else if raw.trim().is_empty() {
            Ok(Self::default())
        } else {
            Ok(serde_yaml::from_str(raw)?)
        }
    }

    pub fn render(&self, path: Option<&Path>) -> Result<String> {
        if is_json(path) {
            Ok(serde_json::to_string_pretty(self)?)
        } else {
            Ok(serde_yaml::to_string(self)?)
        }
    }

    /// Servers in declaration order, each with its tools in declaration order.
    #[must_use]
    pub fn servers_with_tools(&self) -> Vec<(ServerRecord, Vec<ToolRecord>)> {
        self.servers
            .iter()
            .map(|s| {
                let tools = self
                    .tools
                    .iter()
                    .filter(|t| t.server_id == s.server_id)
                    .cloned()
                    .collect();
                (s.clone(), tools)
            })
            .collect()
    }
}

fn is_json(path: Option<&Path>) -> bool {
    path.and_then(Path::extension)
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

#[async_trait]
pub trait BridgeStore: Send + Sync {
    async fn list_servers(&self) -> Result<Vec<ServerRecord>>;
    async fn get_server(&self, server_id: &str) -> Result<Option<ServerRecord>>;
    async fn create_server(&self, record: ServerRecord) -> Result<()>;
    /// Deletes the server and its tool records. Returns whether the server existed.
    async fn delete_server(&self, server_id: &str) -> Result<bool>;

    async fn list_tools(&self, server_id: &str) -> Result<Vec<ToolRecord>>;
    async fn get_tool(&self, tool_id: &str) -> Result<Option<ToolRecord>>;
    async fn create_tools(&self, records: Vec<ToolRecord>) -> Result<()>;
    async fn update_tool(&self, record: ToolRecord) -> Result<()>;
    async fn delete_tool(&self, tool_id: &str) -> Result<Option<ToolRecord>>;
}

#[async_trait]
pub trait CustomToolLookup: Send + Sync {
    async fn get_custom_tool(&self, id: &str) -> Result<Option<CustomToolRecord>>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreSnapshot>,
    persist_to: Option<PathBuf>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(snapshot: StoreSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            persist_to: None,
        }
    }

    /// Load a snapshot file. With `persist`, every mutation is written back to it.
    pub async fn load(path: &Path, persist: bool) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let snapshot = StoreSnapshot::parse(&raw, Some(path))?;
        tracing::info!(
            path = %path.display(),
            servers = snapshot.servers.len(),
            tools = snapshot.tools.len(),
            custom_tools = snapshot.custom_tools.len(),
            "loaded state file"
        );
        Ok(Self {
            state: RwLock::new(snapshot),
            persist_to: persist.then(|| path.to_path_buf()),
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.read().clone()
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.persist_to else {
            return Ok(());
        };
        let rendered = self.snapshot().render(Some(path))?;
        tokio::fs::write(path, rendered).await?;
        tracing::debug!(path = %path.display(), "state file written");
        Ok(())
    }
}

#[async_trait]
impl BridgeStore for MemoryStore {
    async fn list_servers(&self) -> Result<Vec<ServerRecord>> {
        Ok(self.state.read().servers.clone())
    }

    async fn get_server(&self, server_id: &str) -> Result<Option<ServerRecord>> {
        Ok(self
            .state
            .read()
            .servers
            .iter()
            .find(|s| s.server_id == server_id)
            .cloned())
    }

    async fn create_server(&self, record: ServerRecord) -> Result<()> {
        {
            let mut state = self.state.write();
            if state.servers.iter().any(|s| s.server_id == record.server_id) {
                return Err(BridgeError::Store(format!(
                    "server record '{}' already exists",
                    record.server_id
                )));
            }
            state.servers.push(record);
        }
        self.persist().await
    }

    async fn delete_server(&self, server_id: &str) -> Result<bool> {
        let existed = {
            let mut state = self.state.write();
            let before = state.servers.len();
            state.servers.retain(|s| s.server_id != server_id);
            state.tools.retain(|t| t.server_id != server_id);
            state.servers.len() != before
        };
        if existed {
            self.persist().await?;
        }
        Ok(existed)
    }

    async fn list_tools(&self, server_id: &str) -> Result<Vec<ToolRecord>> {
        Ok(self
            .state
            .read()
            .tools
            .iter()
            .filter(|t| t.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn get_tool(&self, tool_id: &str) -> Result<Option<ToolRecord>> {
        Ok(self
            .state
            .read()
            .tools
            .iter()
            .find(|t| t.id == tool_id)
            .cloned())
    }

    async fn create_tools(&self, records: Vec<ToolRecord>) -> Result<()> {
        {
            let mut state = self.state.write();
            if let Some(dup) = records
                .iter()
                .find(|r| state.tools.iter().any(|t| t.id == r.id))
            {
                return Err(BridgeError::Store(format!(
                    "tool record '{}' already exists",
                    dup.id
                )));
            }
            state.tools.extend(records);
        }
        self.persist().await
    }

    async fn update_tool(&self, record: ToolRecord) -> Result<()> {
        {
            let mut state = self.state.write();
            let slot = state
                .tools
                .iter_mut()
                .find(|t| t.id == record.id)
                .ok_or_else(|| BridgeError::ToolNotFound(record.id.clone()))?;
            *slot = record;
        }
        self.persist().await
    }

    async fn delete_tool(&self, tool_id: &str) -> Result<Option<ToolRecord>> {
        let removed = {
            let mut state = self.state.write();
            state
                .tools
                .iter()
                .position(|t| t.id == tool_id)
                .map(|idx| state.tools.remove(idx))
        };
        if removed.is_some() {
            self.persist().await?;
        }
        Ok(removed)
    }
}

#[async_trait]
impl CustomToolLookup for MemoryStore {
    async fn get_custom_tool(&self, id: &str) -> Result<Option<CustomToolRecord>> {
        Ok(self
            .state
            .read()
            .custom_tools
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }
}
