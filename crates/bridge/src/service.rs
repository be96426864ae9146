//! Administrative workflow: keeps the store and the live registry in step.

use crate::bootstrap;
use crate::error::{BridgeError, ErrorKey, RegistryError, Result};
use crate::registry::{ToolServerRegistry, Transport};
use crate::schema_builder::{McpSchema, SchemaBuilderRegistry, ToolInfo, ToolUpdate};
use crate::store::{BridgeStore, ServerRecord, ToolRecord};
use crate::tools::ToolDescriptor;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServerRequest {
    /// Generated when absent.
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "desc")]
    pub description: String,
}

#[derive(Clone)]
pub struct BridgeService {
    registry: Arc<ToolServerRegistry>,
    store: Arc<dyn BridgeStore>,
    builders: Arc<SchemaBuilderRegistry>,
}

impl BridgeService {
    #[must_use]
    pub fn new(
        registry: Arc<ToolServerRegistry>,
        store: Arc<dyn BridgeStore>,
        builders: Arc<SchemaBuilderRegistry>,
    ) -> Self {
        Self {
            registry,
            store,
            builders,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ToolServerRegistry> {
        &self.registry
    }

    /// Start every persisted server.
    pub async fn bootstrap(&self) -> Result<usize> {
        bootstrap::rehydrate(self.store.as_ref(), &self.builders, &self.registry).await
    }

    fn ensure_server(&self, server_id: &str) -> Result<()> {
        if self.registry.exists(server_id) {
            Ok(())
        } else {
            Err(BridgeError::registry(
                ErrorKey::McpServerNotExist,
                RegistryError::NotFound(server_id.to_string()),
            ))
        }
    }

    /// Reject names that are repeated or already served, before anything is persisted.
    fn ensure_names_free<'n>(
        &self,
        server_id: &str,
        names: impl IntoIterator<Item = &'n str>,
    ) -> Result<()> {
        let served = self
            .registry
            .tool_names(server_id, Transport::Streamable)
            .unwrap_or_default();
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) || served.iter().any(|s| s == name) {
                return Err(BridgeError::registry(
                    ErrorKey::McpServerRegisterToolErr,
                    RegistryError::ToolNameTaken {
                        server_id: server_id.to_string(),
                        tool: name.to_string(),
                    },
                ));
            }
        }
        Ok(())
    }

    pub async fn create_server(&self, req: CreateServerRequest) -> Result<ServerRecord> {
        let server_id = req
            .server_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if self.registry.exists(&server_id) {
            return Err(BridgeError::registry(
                ErrorKey::McpServerStartErr,
                RegistryError::AlreadyExists(server_id),
            ));
        }

        let record = ServerRecord {
            server_id,
            name: req.name,
            description: req.description,
        };
        self.store.create_server(record.clone()).await?;
        self.registry
            .create_server(&record.server_id)
            .map_err(|e| BridgeError::registry(ErrorKey::McpServerStartErr, e))?;
        Ok(record)
    }

    pub async fn delete_server(&self, server_id: &str) -> Result<()> {
        self.ensure_server(server_id)?;
        self.store.delete_server(server_id).await?;
        self.registry
            .shutdown(server_id)
            .await
            .map_err(|e| BridgeError::registry(ErrorKey::McpServerShutdownErr, e))
    }

    pub async fn list_tools(&self, server_id: &str) -> Result<Vec<ToolRecord>> {
        self.ensure_server(server_id)?;
        self.store.list_tools(server_id).await
    }

    /// Build, store and register the tools described by `info`.
    pub async fn create_tools(&self, server_id: &str, info: &ToolInfo) -> Result<Vec<ToolRecord>> {
        self.ensure_server(server_id)?;
        let McpSchema { tools, records } = self.builders.create_mcp_schema(server_id, info).await?;
        self.ensure_names_free(server_id, tools.iter().map(ToolDescriptor::name))?;
        self.store.create_tools(records.clone()).await?;
        self.registry
            .register_tools(server_id, &tools)
            .await
            .map_err(|e| BridgeError::registry(ErrorKey::McpServerRegisterToolErr, e))?;
        Ok(records)
    }

    /// Rename/re-describe a tool. Unchanged name and description is a no-op.
    pub async fn update_tool(&self, tool_id: &str, update: &ToolUpdate) -> Result<ToolRecord> {
        let existing = self
            .store
            .get_tool(tool_id)
            .await?
            .ok_or_else(|| BridgeError::ToolNotFound(tool_id.to_string()))?;
        self.ensure_server(&existing.server_id)?;
        if existing.tool_name == update.method_name.trim()
            && existing.description == update.description
        {
            return Ok(existing);
        }

        let McpSchema { tools, records } =
            self.builders.update_mcp_schema(update, &existing).await?;
        let record = records
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::ToolNotFound(tool_id.to_string()))?;
        if record.tool_name != existing.tool_name {
            self.ensure_names_free(&existing.server_id, [record.tool_name.as_str()])?;
        }
        self.store.update_tool(record.clone()).await?;

        self.registry
            .unregister_tools(&existing.server_id, std::slice::from_ref(&existing.tool_name))
            .await
            .map_err(|e| BridgeError::registry(ErrorKey::McpServerUnregisterToolErr, e))?;
        self.registry
            .register_tools(&existing.server_id, &tools)
            .await
            .map_err(|e| BridgeError::registry(ErrorKey::McpServerRegisterToolErr, e))?;
        Ok(record)
    }

    pub async fn delete_tool(&self, tool_id: &str) -> Result<ToolRecord> {
        let existing = self
            .store
            .get_tool(tool_id)
            .await?
            .ok_or_else(|| BridgeError::ToolNotFound(tool_id.to_string()))?;
        self.ensure_server(&existing.server_id)?;
        self.store.delete_tool(tool_id).await?;
        self.registry
            .unregister_tools(&existing.server_id, std::slice::from_ref(&existing.tool_name))
            .await
            .map_err(|e| BridgeError::registry(ErrorKey::McpServerUnregisterToolErr, e))?;
        Ok(existing)
    }
}
