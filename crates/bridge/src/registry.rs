//! Live tool servers keyed by server id.
//!
//! Each entry owns one SSE endpoint and one streamable HTTP endpoint, created and destroyed
//! together. Registry mutations take the write lock; the lock is never held across an `.await`,
//! so list-changed notifications run after it is released.

use crate::error::RegistryError;
use crate::sse::SseEndpoint;
use crate::streamable::StreamableEndpoint;
use crate::tools::ToolDescriptor;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Settings shared by every endpoint the registry creates.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Prefix of the message URL announced to SSE clients. Empty means a relative URL.
    pub public_base_url: String,
    pub sse_keep_alive: Duration,
    /// Query parameters copied from the SSE connect request into the announced message URL.
    pub copy_params: Arc<[String]>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            public_base_url: String::new(),
            sse_keep_alive: DEFAULT_SSE_KEEP_ALIVE,
            copy_params: Arc::from(vec!["key".to_string()]),
        }
    }
}

/// Which transport table to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Sse,
    Streamable,
}

pub struct ServerEntry {
    sse: Arc<SseEndpoint>,
    streamable: Arc<StreamableEndpoint>,
}

impl ServerEntry {
    fn new(server_id: &str, settings: &TransportSettings) -> Self {
        let id: Arc<str> = Arc::from(server_id);
        Self {
            sse: Arc::new(SseEndpoint::new(
                Arc::clone(&id),
                settings.public_base_url.clone(),
                Arc::clone(&settings.copy_params),
                settings.sse_keep_alive,
            )),
            streamable: Arc::new(StreamableEndpoint::new(id, settings.sse_keep_alive)),
        }
    }

    async fn notify_tools_changed(&self) {
        self.sse.notify_tools_changed().await;
        self.streamable.notify_tools_changed().await;
    }
}

/// First name in `tools` that is already served by `entry` or repeated within the batch.
fn taken_name(entry: &ServerEntry, tools: &[ToolDescriptor]) -> Option<String> {
    let mut batch = HashSet::new();
    tools
        .iter()
        .map(ToolDescriptor::name)
        .find(|name| !batch.insert(*name) || entry.streamable.tools().contains(name))
        .map(str::to_string)
}

#[derive(Default)]
pub struct ToolServerRegistry {
    servers: RwLock<HashMap<String, Arc<ServerEntry>>>,
    settings: TransportSettings,
}

impl ToolServerRegistry {
    #[must_use]
    pub fn new(settings: TransportSettings) -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            settings,
        }
    }

    /// Create both transport endpoints for `server_id`.
    pub fn create_server(&self, server_id: &str) -> Result<(), RegistryError> {
        let mut servers = self.servers.write();
        if servers.contains_key(server_id) {
            return Err(RegistryError::AlreadyExists(server_id.to_string()));
        }
        servers.insert(
            server_id.to_string(),
            Arc::new(ServerEntry::new(server_id, &self.settings)),
        );
        tracing::info!(server_id, "tool server started");
        Ok(())
    }

    /// Add tools to both tables. A name already registered on the server, or repeated within
    /// `tools`, is rejected and nothing is added.
    pub async fn register_tools(
        &self,
        server_id: &str,
        tools: &[ToolDescriptor],
    ) -> Result<(), RegistryError> {
        let entry = {
            let servers = self.servers.write();
            let entry = servers
                .get(server_id)
                .ok_or_else(|| RegistryError::NotFound(server_id.to_string()))?;
            if let Some(tool) = taken_name(entry, tools) {
                return Err(RegistryError::ToolNameTaken {
                    server_id: server_id.to_string(),
                    tool,
                });
            }
            entry.sse.register(tools);
            entry.streamable.register(tools);
            Arc::clone(entry)
        };
        tracing::debug!(server_id, count = tools.len(), "tools registered");
        entry.notify_tools_changed().await;
        Ok(())
    }

    /// Remove tools from both tables. Unknown names are ignored.
    pub async fn unregister_tools(
        &self,
        server_id: &str,
        names: &[String],
    ) -> Result<(), RegistryError> {
        let entry = {
            let servers = self.servers.write();
            let entry = servers
                .get(server_id)
                .ok_or_else(|| RegistryError::NotFound(server_id.to_string()))?;
            entry.sse.unregister(names);
            entry.streamable.unregister(names);
            Arc::clone(entry)
        };
        tracing::debug!(server_id, count = names.len(), "tools unregistered");
        entry.notify_tools_changed().await;
        Ok(())
    }

    /// Remove the server and stop both transports.
    pub async fn shutdown(&self, server_id: &str) -> Result<(), RegistryError> {
        let entry = self
            .servers
            .write()
            .remove(server_id)
            .ok_or_else(|| RegistryError::NotFound(server_id.to_string()))?;
        entry.sse.shutdown();
        entry.streamable.shutdown().await;
        tracing::info!(server_id, "tool server stopped");
        Ok(())
    }

    pub async fn shutdown_all(&self) {
        let entries: Vec<(String, Arc<ServerEntry>)> = self.servers.write().drain().collect();
        for (server_id, entry) in entries {
            entry.sse.shutdown();
            entry.streamable.shutdown().await;
            tracing::info!(%server_id, "tool server stopped");
        }
    }

    #[must_use]
    pub fn exists(&self, server_id: &str) -> bool {
        self.servers.read().contains_key(server_id)
    }

    #[must_use]
    pub fn lookup_sse(&self, server_id: &str) -> Option<Arc<SseEndpoint>> {
        self.servers
            .read()
            .get(server_id)
            .map(|e| Arc::clone(&e.sse))
    }

    #[must_use]
    pub fn lookup_streamable(&self, server_id: &str) -> Option<Arc<StreamableEndpoint>> {
        self.servers
            .read()
            .get(server_id)
            .map(|e| Arc::clone(&e.streamable))
    }

    #[must_use]
    pub fn tool_names(&self, server_id: &str, transport: Transport) -> Option<Vec<String>> {
        self.servers.read().get(server_id).map(|e| match transport {
            Transport::Sse => e.sse.tools().names(),
            Transport::Streamable => e.streamable.tools().names(),
        })
    }

    #[must_use]
    pub fn server_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.servers.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
