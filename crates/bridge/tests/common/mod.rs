#![allow(dead_code)]

use anyhow::Context as _;
use mcp_bridge::config::Cli;
use mcp_bridge::service::BridgeService;
use serde_json::{Value, json};
use std::process::{Child, Command};
use std::time::Duration;
use tokio::task::JoinHandle;

pub use mcp_bridge_test_support::{
    EchoServer, KillOnDrop, pick_unused_port, spawn_echo_server, wait_http_ok,
};

pub fn spawn_bridge(config_path: &std::path::Path, port: u16) -> anyhow::Result<Child> {
    let bin = env!("CARGO_BIN_EXE_mcp-bridge");
    Command::new(bin)
        .arg("--config")
        .arg(config_path)
        .arg("--bind")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--public-base-url")
        .arg(format!("http://127.0.0.1:{port}"))
        .arg("--log-level")
        .arg("info")
        .spawn()
        .context("spawn bridge")
}

/// A bridge served from this test process on an ephemeral port.
pub struct InProcessBridge {
    pub base_url: String,
    pub service: BridgeService,
    handle: JoinHandle<()>,
}

impl Drop for InProcessBridge {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl InProcessBridge {
    pub async fn start() -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind bridge")?;
        let base_url = format!("http://{}", listener.local_addr()?);

        let cli = <Cli as clap::Parser>::try_parse_from([
            "mcp-bridge",
            "--public-base-url",
            base_url.as_str(),
            "--sse-keep-alive-secs",
            "1",
        ])?;
        let service = mcp_bridge::build_service(&cli).await?;
        let app = mcp_bridge::http::router(service.clone());
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url,
            service,
            handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Send an admin request; returns status and JSON body (`Null` for empty bodies).
pub async fn admin(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    body: Option<Value>,
) -> anyhow::Result<(u16, Value)> {
    let mut req = client.request(method, url);
    if let Some(body) = body {
        req = req.json(&body);
    }
    let resp = req.send().await.context("admin request")?;
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    let body = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).with_context(|| format!("admin body is not JSON: {text}"))?
    };
    Ok((status, body))
}

/// Users API served by `api_base`.
pub fn users_doc(api_base: &str) -> String {
    json!({
        "openapi": "3.0.0",
        "info": { "title": "users", "version": "1" },
        "servers": [ { "url": api_base } ],
        "paths": {
            "/users/{id}": {
                "get": {
                    "operationId": "getUser",
                    "summary": "Fetch one user",
                    "parameters": [
                        { "name": "id", "in": "path", "required": true, "schema": { "type": "integer" } }
                    ],
                    "responses": { "200": { "description": "ok" } }
                }
            },
            "/users": {
                "post": {
                    "operationId": "createUser",
                    "requestBody": {
                        "content": { "application/json": { "schema": { "type": "object" } } }
                    },
                    "responses": { "200": { "description": "ok" } }
                }
            }
        }
    })
    .to_string()
}

/// `POST /admin/v1/servers/{server_id}/tools` body for an inline document.
pub fn openapi_tool(doc: &str, methods: &[&str], api_key: Option<(&str, &str)>) -> Value {
    let api_auth = match api_key {
        Some((header, key)) => json!({ "type": "API Key", "customHeaderName": header, "apiKey": key }),
        None => json!({}),
    };
    json!({
        "type": "openapi",
        "name": "users",
        "schema": doc,
        "methodNames": methods,
        "apiAuth": api_auth,
    })
}

/// Poll `cond` until it holds.
pub async fn eventually(timeout_dur: Duration, mut cond: impl FnMut() -> bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout_dur;
    while !cond() {
        anyhow::ensure!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {timeout_dur:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}
