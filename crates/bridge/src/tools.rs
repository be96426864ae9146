//! Per-endpoint tool tables.

use mcp_bridge_openapi::Callable;
use parking_lot::RwLock;
use rmcp::model::Tool;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A registered tool: what is advertised plus the callable that serves it.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    tool: Tool,
    callable: Arc<Callable>,
}

impl ToolDescriptor {
    #[must_use]
    pub fn new(callable: Callable) -> Self {
        Self {
            tool: callable.tool(),
            callable: Arc::new(callable),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.tool.name
    }

    #[must_use]
    pub fn tool(&self) -> &Tool {
        &self.tool
    }

    #[must_use]
    pub fn callable(&self) -> &Arc<Callable> {
        &self.callable
    }
}

/// Name-keyed tools of one transport endpoint. The registry checks names are free before it
/// inserts, so a descriptor is never silently replaced.
#[derive(Debug, Default)]
pub struct ToolTable {
    tools: RwLock<BTreeMap<String, ToolDescriptor>>,
}

impl ToolTable {
    pub fn insert_all(&self, tools: &[ToolDescriptor]) {
        let mut map = self.tools.write();
        for t in tools {
            map.insert(t.name().to_string(), t.clone());
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Unknown names are ignored.
    pub fn remove_all(&self, names: &[String]) {
        let mut map = self.tools.write();
        for name in names {
            map.remove(name);
        }
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn list(&self) -> Vec<Tool> {
        self.tools.read().values().map(|t| t.tool.clone()).collect()
    }

    /// Cloned out so the table lock is released before the call runs.
    #[must_use]
    pub fn callable(&self, name: &str) -> Option<Arc<Callable>> {
        self.tools
            .read()
            .get(name)
            .map(|t| Arc::clone(&t.callable))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}
