//! Legacy SSE endpoint of one tool server.
//!
//! `GET .../sse` opens a session: the first event (`endpoint`) announces the URL the client posts
//! its JSON-RPC messages to, and every server message afterwards is sent as a `message` event.
//! rmcp drives the session over a plain sink/stream pair; this module only moves messages between
//! axum and those channels.

use crate::contracts::ContractNotifier;
use crate::handler::ToolServerHandler;
use crate::tools::{ToolDescriptor, ToolTable};
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse as _, Response, Sse};
use futures::StreamExt as _;
use parking_lot::RwLock;
use rmcp::ServiceExt as _;
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, PollSender};

/// Query parameter naming the session in message posts.
pub const SESSION_ID_PARAM: &str = "sessionId";

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct SseSession {
    to_server: mpsc::Sender<ClientJsonRpcMessage>,
    ct: CancellationToken,
}

#[derive(Debug)]
pub struct SseEndpoint {
    server_id: Arc<str>,
    public_base_url: String,
    copy_params: Arc<[String]>,
    keep_alive: Duration,
    tools: Arc<ToolTable>,
    contracts: Arc<ContractNotifier>,
    sessions: Arc<RwLock<HashMap<String, SseSession>>>,
    ct: CancellationToken,
}

impl SseEndpoint {
    #[must_use]
    pub fn new(
        server_id: Arc<str>,
        public_base_url: impl Into<String>,
        copy_params: Arc<[String]>,
        keep_alive: Duration,
    ) -> Self {
        Self {
            server_id,
            public_base_url: public_base_url.into(),
            copy_params,
            keep_alive,
            tools: Arc::new(ToolTable::default()),
            contracts: Arc::new(ContractNotifier::default()),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ct: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn tools(&self) -> &ToolTable {
        &self.tools
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Sessions that finished the initialize handshake.
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
            tracing::debug!(server_id = %self.server_id, transport = "sse", "tool list changed");
        }
    }

    /// URL announced in the `endpoint` event. Parameters listed in `copy_params` are carried over
    /// from the connect request.
    pub(crate) fn message_url(&self, session_id: &str, query: &HashMap<String, String>) -> String {
        let mut qs = url::form_urlencoded::Serializer::new(String::new());
        qs.append_pair(SESSION_ID_PARAM, session_id);
        for name in self.copy_params.iter() {
            if let Some(value) = query.get(name) {
                qs.append_pair(name, value);
            }
        }
        format!(
            "{}/mcp/{}/message?{}",
            self.public_base_url.trim_end_matches('/'),
            self.server_id,
            qs.finish()
        )
    }

    /// Open a new session and return its event stream.
    pub fn connect(&self, query: &HashMap<String, String>) -> Response {
        let session_id = uuid::Uuid::new_v4().simple().to_string();
        let session_ct = self.ct.child_token();
        let (to_server_tx, to_server_rx) = mpsc::channel::<ClientJsonRpcMessage>(CHANNEL_CAPACITY);
        let (to_client_tx, to_client_rx) = mpsc::channel::<ServerJsonRpcMessage>(CHANNEL_CAPACITY);

        self.sessions.write().insert(
            session_id.clone(),
            SseSession {
                to_server: to_server_tx,
                ct: session_ct.clone(),
            },
        );
        tracing::debug!(server_id = %self.server_id, mcp_session_id = %session_id, "sse session opened");

        self.spawn_session(
            session_id.clone(),
            session_ct.clone(),
            (
                PollSender::new(to_client_tx),
                ReceiverStream::new(to_server_rx),
            ),
        );

        let endpoint = Event::default()
            .event("endpoint")
            .data(self.message_url(&session_id, query));
        let guard = session_ct.clone().drop_guard();
        let messages = ReceiverStream::new(to_client_rx).map(move |msg| {
            let _keep = &guard;
            let event = Event::default().event("message").json_data(&msg);
            Ok::<_, Infallible>(event.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to encode sse message");
                Event::default().comment("encode error")
            }))
        });
        let stream = futures::stream::once(async move { Ok::<_, Infallible>(endpoint) })
            .chain(messages)
            .take_until(session_ct.cancelled_owned());

        Sse::new(stream)
            .keep_alive(KeepAlive::new().interval(self.keep_alive))
            .into_response()
    }

    fn spawn_session(
        &self,
        session_id: String,
        session_ct: CancellationToken,
        transport: (
            PollSender<ServerJsonRpcMessage>,
            ReceiverStream<ClientJsonRpcMessage>,
        ),
    ) {
        let handler = ToolServerHandler::new(
            Arc::clone(&self.server_id),
            Arc::clone(&self.tools),
            Arc::clone(&self.contracts),
        );
        let contracts = Arc::clone(&self.contracts);
        let sessions = Arc::clone(&self.sessions);
        let server_id = Arc::clone(&self.server_id);

        tokio::spawn(async move {
            match handler.serve_with_ct(transport, session_ct.clone()).await {
                Ok(running) => {
                    contracts.observe_peer(&session_id, running.peer().clone());
                    if let Err(e) = running.waiting().await {
                        tracing::debug!(%server_id, mcp_session_id = %session_id, error = %e, "sse session task failed");
                    }
                }
                Err(e) => {
                    tracing::debug!(%server_id, mcp_session_id = %session_id, error = %e, "sse session ended before initialize");
                }
            }
            session_ct.cancel();
            sessions.write().remove(&session_id);
            contracts.forget_peer(&session_id);
            tracing::debug!(%server_id, mcp_session_id = %session_id, "sse session closed");
        });
    }

    /// Deliver a client message to a session. Returns `false` when the session is unknown or
    /// already closed.
    pub async fn post_message(&self, session_id: &str, message: ClientJsonRpcMessage) -> bool {
        let Some(session) = self.sessions.read().get(session_id).cloned() else {
            return false;
        };
        if session.ct.is_cancelled() {
            return false;
        }
        session.to_server.send(message).await.is_ok()
    }

    /// Cancel every open session.
    pub(crate) fn shutdown(&self) {
        self.ct.cancel();
        self.sessions.write().clear();
        self.contracts.forget_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(base: &str) -> SseEndpoint {
        SseEndpoint::new(
            Arc::from("srv-1"),
            base,
            Arc::from(vec!["key".to_string()]),
            Duration::from_secs(15),
        )
    }

    #[test]
    fn message_url_copies_key() {
        let ep = endpoint("http://bridge.local/");
        let query = HashMap::from([
            ("key".to_string(), "a b&c".to_string()),
            ("other".to_string(), "x".to_string()),
        ]);
        assert_eq!(
            ep.message_url("abc", &query),
            "http://bridge.local/mcp/srv-1/message?sessionId=abc&key=a+b%26c"
        );
    }

    #[test]
    fn message_url_without_key_is_relative_when_base_empty() {
        let ep = endpoint("");
        assert_eq!(
            ep.message_url("abc", &HashMap::new()),
            "/mcp/srv-1/message?sessionId=abc"
        );
    }

    #[tokio::test]
    async fn post_to_unknown_session_is_rejected() {
        let ep = endpoint("");
        let msg: ClientJsonRpcMessage = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .unwrap();
        assert!(!ep.post_message("missing", msg).await);
    }

    #[tokio::test]
    async fn shutdown_drops_sessions() {
        let ep = endpoint("");
        let _resp = ep.connect(&HashMap::new());
        assert_eq!(ep.session_count(), 1);
        ep.shutdown();
        assert_eq!(ep.session_count(), 0);
    }
}
