//! Streamable HTTP endpoint of one tool server (stateful sessions, `Mcp-Session-Id`).

use crate::contracts::ContractNotifier;
use crate::handler::ToolServerHandler;
use crate::session_manager::BridgeSessionManager;
use crate::tools::{ToolDescriptor, ToolTable};
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt as _;

pub struct StreamableEndpoint {
    server_id: Arc<str>,
    tools: Arc<ToolTable>,
    contracts: Arc<ContractNotifier>,
    sessions: Arc<BridgeSessionManager>,
    service: StreamableHttpService<ToolServerHandler, BridgeSessionManager>,
    ct: CancellationToken,
}

impl StreamableEndpoint {
    #[must_use]
    pub fn new(server_id: Arc<str>, sse_keep_alive: Duration) -> Self {
        let tools = Arc::new(ToolTable::default());
        let contracts = Arc::new(ContractNotifier::default());
        let sessions = Arc::new(BridgeSessionManager::new(Arc::clone(&contracts)));
        let ct = CancellationToken::new();

        let handler = ToolServerHandler::new(
            Arc::clone(&server_id),
            Arc::clone(&tools),
            Arc::clone(&contracts),
        );
        let service = StreamableHttpService::new(
            move || Ok(handler.clone()),
            Arc::clone(&sessions),
            StreamableHttpServerConfig {
                stateful_mode: true,
                sse_keep_alive: Some(sse_keep_alive),
                cancellation_token: ct.child_token(),
                ..Default::default()
            },
        );

        Self {
            server_id,
            tools,
            contracts,
            sessions,
            service,
            ct,
        }
    }

    #[must_use]
    pub fn tools(&self) -> &ToolTable {
        &self.tools
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.session_count()
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.contracts.peer_count()
    }

    pub(crate) fn register(&self, tools: &[ToolDescriptor]) {
        self.tools.insert_all(tools);
    }

    pub(crate) fn unregister(&self, names: &[String]) {
        self.tools.remove_all(names);
    }

    pub(crate) async fn notify_tools_changed(&self) {
        if self.contracts.update_and_notify(&self.tools.list()).await {
            tracing::debug!(server_id = %self.server_id, transport = "streamable", "tool list changed");
        }
    }

    /// Serve one HTTP request (POST, GET or DELETE) against this endpoint.
    pub async fn handle(&self, req: Request<Body>) -> Response {
        let resp = self
            .service
            .clone()
            .oneshot(req)
            .await
            .unwrap_or_else(|never| match never {});
        resp.map(Body::new)
    }

    /// Stop accepting work and close every session.
    pub(crate) async fn shutdown(&self) {
        self.ct.cancel();
        self.sessions.close_all().await;
        self.contracts.forget_all();
    }
}
