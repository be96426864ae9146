use parking_lot::RwLock;
use rmcp::{
    model::Tool,
    service::{Peer, RoleServer},
};
use serde_json::Value;
use sha2::Digest as _;
use std::collections::HashMap;

/// Connected peers of one endpoint plus a hash of the tool list they were last shown.
///
/// `notifications/tools/list_changed` is only sent when the hash actually moves, so re-registering
/// an identical tool does not wake clients up. The baseline is the empty tool list: the first
/// registration on a fresh endpoint is a change.
#[derive(Debug)]
pub struct ContractNotifier {
    peers: RwLock<HashMap<String, Peer<RoleServer>>>,
    tools_hash: RwLock<String>,
}

impl Default for ContractNotifier {
    fn default() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            tools_hash: RwLock::new(tools_contract_hash(&[])),
        }
    }
}

impl ContractNotifier {
    pub fn observe_peer(&self, session_id: &str, peer: Peer<RoleServer>) {
        self.peers.write().insert(session_id.to_string(), peer);
    }

    pub fn forget_peer(&self, session_id: &str) {
        self.peers.write().remove(session_id);
    }

    pub fn forget_all(&self) {
        self.peers.write().clear();
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Record the current tool list and notify peers if it differs from the last one.
    /// Returns whether it differed.
    pub async fn update_and_notify(&self, tools: &[Tool]) -> bool {
        let new_hash = tools_contract_hash(tools);
        let changed = {
            let mut current = self.tools_hash.write();
            if *current == new_hash {
                false
            } else {
                *current = new_hash;
                true
            }
        };

        if changed {
            self.notify_tool_list_changed().await;
        }
        changed
    }

    async fn notify_tool_list_changed(&self) {
        let peers: Vec<(String, Peer<RoleServer>)> = self
            .peers
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut dead: Vec<String> = Vec::new();
        for (session_id, peer) in peers {
            if let Err(e) = peer.notify_tool_list_changed().await {
                tracing::debug!(mcp_session_id = %session_id, error = %e, "failed to send tools list_changed");
                dead.push(session_id);
            }
        }

        if !dead.is_empty() {
            let mut map = self.peers.write();
            for id in dead {
                map.remove(&id);
            }
        }
    }
}

fn tools_contract_hash(tools: &[Tool]) -> String {
    let mut entries: Vec<(String, Value)> = tools
        .iter()
        .map(|t| {
            let annotations = serde_json::to_value(&t.annotations).unwrap_or(Value::Null);
            let entry = serde_json::json!({
                "name": t.name,
                "description": t.description.as_deref().unwrap_or_default(),
                "inputSchema": Value::Object(t.input_schema.as_ref().clone()),
                "annotations": annotations,
            });
            (t.name.to_string(), canonicalize_json(&entry))
        })
        .collect();

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let v = Value::Array(entries.into_iter().map(|(_k, v)| v).collect());
    let serialized = serde_json::to_string(&v).unwrap_or_default();
    hex::encode(sha2::Sha256::digest(serialized.as_bytes()))
}

fn canonicalize_json(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                if let Some(val) = map.get(&k) {
                    out.insert(k, canonicalize_json(val));
                }
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonicalize_json).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::JsonObject;
    use std::sync::Arc;

    fn tool(name: &str, description: &str) -> Tool {
        Tool::new(
            name.to_string(),
            description.to_string(),
            Arc::new(JsonObject::new()),
        )
    }

    #[test]
    fn hash_ignores_order() {
        let a = tool("a", "first");
        let b = tool("b", "second");
        assert_eq!(
            tools_contract_hash(&[a.clone(), b.clone()]),
            tools_contract_hash(&[b, a])
        );
    }

    #[tokio::test]
    async fn only_effective_changes_count() {
        let notifier = ContractNotifier::default();
        assert!(!notifier.update_and_notify(&[]).await);
        assert!(notifier.update_and_notify(&[tool("a", "x")]).await);
        assert!(!notifier.update_and_notify(&[tool("a", "x")]).await);
        assert!(notifier.update_and_notify(&[tool("a", "y")]).await);
        assert!(notifier.update_and_notify(&[]).await);
    }
}
