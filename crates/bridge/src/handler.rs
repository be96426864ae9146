//! MCP server handler shared by both transports of a tool server.

use crate::contracts::ContractNotifier;
use crate::tools::ToolTable;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Extensions, Implementation, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo,
};
use rmcp::service::{NotificationContext, Peer, RequestContext};
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use std::sync::Arc;

/// Header carrying the streamable HTTP session id.
pub(crate) const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

#[derive(Debug, Clone)]
pub struct ToolServerHandler {
    server_id: Arc<str>,
    tools: Arc<ToolTable>,
    contracts: Arc<ContractNotifier>,
}

impl ToolServerHandler {
    #[must_use]
    pub fn new(server_id: Arc<str>, tools: Arc<ToolTable>, contracts: Arc<ContractNotifier>) -> Self {
        Self {
            server_id,
            tools,
            contracts,
        }
    }
}

impl ToolServerHandler {
    /// Remember the peer of a streamable HTTP session so it receives `list_changed`
    /// notifications. SSE sessions register their peer when the session task starts.
    fn observe_session(&self, extensions: &Extensions, peer: &Peer<RoleServer>) {
        let session_id = extensions
            .get::<axum::http::request::Parts>()
            .and_then(|parts| parts.headers.get(MCP_SESSION_ID_HEADER))
            .and_then(|v| v.to_str().ok());

        if let Some(session_id) = session_id {
            tracing::trace!(server_id = %self.server_id, mcp_session_id = %session_id, "observed session");
            self.contracts.observe_peer(session_id, peer.clone());
        }
    }
}

impl ServerHandler for ToolServerHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_tool_list_changed()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!("Tools of MCP server '{}'", self.server_id)),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        self.observe_session(&context.extensions, &context.peer);
        Ok(ListToolsResult {
            meta: None,
            tools: self.tools.list(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let Some(callable) = self.tools.callable(&params.name) else {
            return Err(McpError::invalid_params(
                format!("tool '{}' not found", params.name),
                None,
            ));
        };

        tracing::debug!(server_id = %self.server_id, tool = %params.name, "calling tool");
        let arguments = params.arguments.unwrap_or_default();
        Ok(callable.call_with_cancel(&arguments, &context.ct).await)
    }

    async fn on_initialized(&self, context: NotificationContext<RoleServer>) {
        self.observe_session(&context.extensions, &context.peer);
    }
}
