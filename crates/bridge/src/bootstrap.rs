//! Rebuild the live registry from persisted state.

use crate::error::{BridgeError, ErrorKey, Result};
use crate::registry::ToolServerRegistry;
use crate::schema_builder::SchemaBuilderRegistry;
use crate::store::BridgeStore;

/// Start every stored server with its stored tools. The first failure aborts.
///
/// Returns the number of servers started.
pub async fn rehydrate(
    store: &dyn BridgeStore,
    builders: &SchemaBuilderRegistry,
    registry: &ToolServerRegistry,
) -> Result<usize> {
    let servers = store.list_servers().await?;
    for server in &servers {
        let records = store.list_tools(&server.server_id).await?;
        let mut tools = Vec::with_capacity(records.len());
        for record in &records {
            let tool = builders.rebuild_tool(record).await.inspect_err(|e| {
                tracing::error!(server_id = %server.server_id, tool = %record.tool_name, error = %e, "failed to rebuild tool");
            })?;
            tools.push(tool);
        }

        registry
            .create_server(&server.server_id)
            .map_err(|e| BridgeError::registry(ErrorKey::McpServerStartErr, e))?;
        registry
            .register_tools(&server.server_id, &tools)
            .await
            .map_err(|e| BridgeError::registry(ErrorKey::McpServerRegisterToolErr, e))?;
        tracing::info!(server_id = %server.server_id, tools = tools.len(), "restored tool server");
    }
    Ok(servers.len())
}
