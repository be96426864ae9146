//! Session manager wrapper for rmcp's streamable HTTP transport.
//!
//! Behavior is delegated to rmcp's `LocalSessionManager`. The wrapper keeps the set of live
//! session ids so a tool server can close all of them on shutdown, and drops a closed session's
//! peer from the endpoint's notifier.

use crate::contracts::ContractNotifier;
use futures::Stream;
use parking_lot::RwLock;
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::transport::common::server_side_http::ServerSseMessage;
use rmcp::transport::streamable_http_server::session::SessionId;
use rmcp::transport::streamable_http_server::session::SessionManager;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

#[derive(Default)]
pub struct BridgeSessionManager {
    inner: LocalSessionManager,
    sessions: RwLock<HashSet<SessionId>>,
    contracts: Arc<ContractNotifier>,
}

impl BridgeSessionManager {
    pub fn new(contracts: Arc<ContractNotifier>) -> Self {
        Self {
            inner: LocalSessionManager::default(),
            sessions: RwLock::new(HashSet::new()),
            contracts,
        }
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Close every live session. Errors are logged; shutdown continues.
    pub async fn close_all(&self) {
        let ids: Vec<SessionId> = self.sessions.write().drain().collect();
        for id in ids {
            if let Err(e) = self.inner.close_session(&id).await {
                tracing::debug!(mcp_session_id = %id, error = %e, "failed to close session");
            }
            self.contracts.forget_peer(id.as_ref());
        }
    }

    async fn create_session_impl(
        &self,
    ) -> Result<(SessionId, <Self as SessionManager>::Transport), <Self as SessionManager>::Error>
    {
        let (id, transport) = self.inner.create_session().await?;
        self.sessions.write().insert(id.clone());
        Ok((id, transport))
    }

    async fn close_session_impl(
        &self,
        id: &SessionId,
    ) -> Result<(), <LocalSessionManager as SessionManager>::Error> {
        let result = self.inner.close_session(id).await;
        self.sessions.write().remove(id);
        self.contracts.forget_peer(id.as_ref());
        result
    }
}

impl SessionManager for BridgeSessionManager {
    type Error = <LocalSessionManager as SessionManager>::Error;
    type Transport = <LocalSessionManager as SessionManager>::Transport;

    fn create_session(
        &self,
    ) -> impl Future<Output = Result<(SessionId, Self::Transport), Self::Error>> + Send {
        self.create_session_impl()
    }

    fn initialize_session(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> impl Future<Output = Result<ServerJsonRpcMessage, Self::Error>> + Send {
        self.inner.initialize_session(id, message)
    }

    fn has_session(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        self.inner.has_session(id)
    }

    fn close_session(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.close_session_impl(id)
    }

    fn create_stream(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> impl Future<
        Output = Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error>,
    > + Send {
        self.inner.create_stream(id, message)
    }

    fn accept_message(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.inner.accept_message(id, message)
    }

    fn create_standalone_stream(
        &self,
        id: &SessionId,
    ) -> impl Future<
        Output = Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error>,
    > + Send {
        self.inner.create_standalone_stream(id)
    }

    fn resume(
        &self,
        id: &SessionId,
        last_event_id: String,
    ) -> impl Future<
        Output = Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error>,
    > + Send {
        self.inner.resume(id, last_event_id)
    }
}
