//! Shared outbound HTTP plumbing for bridged MCP tools.
//!
//! Used by `mcp-bridge-openapi` (call execution) and `mcp-bridge` (persisted auth records).
//! It holds no registry state.

pub mod auth;
pub mod client;
pub mod error;
pub mod safety;
pub mod semantics;
