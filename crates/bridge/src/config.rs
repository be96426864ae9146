//! Command line and environment configuration.

use clap::Parser;
use mcp_bridge_openapi::BaseUrlStrategy;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "mcp-bridge")]
#[command(about = "Serve OpenAPI operations as MCP tools over SSE and streamable HTTP", long_about = None)]
#[command(version)]
pub struct Cli {
    /// State file (YAML or JSON) with servers, tool records and custom tools
    #[arg(short, long, env = "MCP_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, env = "MCP_BRIDGE_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Log filter used when `RUST_LOG` is not set
    #[arg(long, env = "MCP_BRIDGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "MCP_BRIDGE_LOG_JSON")]
    pub log_json: bool,

    /// Prefix of the message URL announced to SSE clients (e.g. `https://bridge.example.com`)
    #[arg(long, env = "MCP_BRIDGE_PUBLIC_BASE_URL", default_value = "")]
    pub public_base_url: String,

    /// Timeout of one outbound API call, in seconds
    #[arg(long, env = "MCP_BRIDGE_CALL_TIMEOUT_SECS", default_value_t = 60)]
    pub call_timeout_secs: u64,

    /// Verify TLS certificates of outbound API calls
    #[arg(long, env = "MCP_BRIDGE_VERIFY_TLS")]
    pub verify_tls: bool,

    /// How to choose among a document's servers: `random` or `round-robin`
    #[arg(long, env = "MCP_BRIDGE_BASE_URL_STRATEGY", default_value = "random")]
    pub base_url_strategy: BaseUrlStrategy,

    /// Keep-alive interval of SSE streams, in seconds
    #[arg(long, env = "MCP_BRIDGE_SSE_KEEP_ALIVE_SECS", default_value_t = 15)]
    pub sse_keep_alive_secs: u64,

    /// Write admin changes back to the state file
    #[arg(long, env = "MCP_BRIDGE_PERSIST", requires = "config")]
    pub persist: bool,
}

impl Cli {
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    #[must_use]
    pub fn sse_keep_alive(&self) -> Duration {
        Duration::from_secs(self.sse_keep_alive_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["mcp-bridge"]).unwrap();
        assert_eq!(cli.bind, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(cli.call_timeout(), Duration::from_secs(60));
        assert_eq!(cli.sse_keep_alive(), Duration::from_secs(15));
        assert_eq!(cli.base_url_strategy, BaseUrlStrategy::Random);
        assert!(!cli.verify_tls);
        assert!(!cli.persist);
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "mcp-bridge",
            "--config",
            "state.yaml",
            "--persist",
            "--base-url-strategy",
            "round-robin",
            "--verify-tls",
            "--call-timeout-secs",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("state.yaml")));
        assert!(cli.persist);
        assert!(cli.verify_tls);
        assert_eq!(cli.base_url_strategy, BaseUrlStrategy::RoundRobin);
        assert_eq!(cli.call_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn persist_needs_config() {
        assert!(Cli::try_parse_from(["mcp-bridge", "--persist"]).is_err());
    }
}
