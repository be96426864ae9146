//! MCP bridge: per-server SSE and streamable HTTP endpoints whose tools are OpenAPI operations.
//!
//! [`registry::ToolServerRegistry`] owns the live endpoints, [`service::BridgeService`] keeps it in
//! step with the [`store`], and [`http::router`] exposes both the MCP transports and the admin API.

pub mod bootstrap;
pub mod config;
pub mod contracts;
pub mod error;
pub mod handler;
pub mod http;
pub mod registry;
pub mod schema_builder;
pub mod service;
pub mod session_manager;
pub mod sse;
pub mod store;
pub mod streamable;
pub mod tools;

use crate::config::Cli;
use crate::error::{BridgeError, Result};
use crate::registry::{ToolServerRegistry, TransportSettings};
use crate::schema_builder::SchemaBuilderRegistry;
use crate::service::BridgeService;
use crate::store::MemoryStore;
use mcp_bridge_http_tools::client::ClientSettings;
use mcp_bridge_openapi::Dispatcher;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing already initialized: {e}");
    }
}

/// Wire store, dispatcher, builders and registry from the command line.
pub async fn build_service(cli: &Cli) -> Result<BridgeService> {
    let store = match &cli.config {
        Some(path) => Arc::new(MemoryStore::load(path, cli.persist).await?),
        None => Arc::new(MemoryStore::default()),
    };

    let client_settings = ClientSettings {
        timeout: cli.call_timeout(),
        accept_invalid_certs: !cli.verify_tls,
    };
    let dispatcher = Dispatcher::new(&client_settings, cli.base_url_strategy.selector())
        .map_err(|e| BridgeError::Config(format!("failed to build http client: {e}")))?;
    let builders =
        SchemaBuilderRegistry::with_default_builders(Arc::new(dispatcher), store.clone());

    let registry = ToolServerRegistry::new(TransportSettings {
        public_base_url: cli.public_base_url.clone(),
        sse_keep_alive: cli.sse_keep_alive(),
        ..TransportSettings::default()
    });

    Ok(BridgeService::new(
        Arc::new(registry),
        store,
        Arc::new(builders),
    ))
}

/// Restore persisted servers, then serve until ctrl-c / SIGTERM.
pub async fn run(cli: Cli) -> Result<()> {
    let service = build_service(&cli).await?;
    let restored = service.bootstrap().await?;
    tracing::info!(servers = restored, "bootstrap complete");

    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "mcp-bridge listening");

    let registry = Arc::clone(service.registry());
    axum::serve(listener, http::router(service))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("shutting down");
            // Open SSE streams only end once their sessions are cancelled.
            registry.shutdown_all().await;
        })
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
