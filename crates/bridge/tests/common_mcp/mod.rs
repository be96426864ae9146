#![allow(dead_code)]

use anyhow::Context as _;
use futures::StreamExt as _;
use futures::stream::BoxStream;
use serde_json::{Value, json};
use sse_stream::{Sse, SseStream};
use std::collections::VecDeque;
use std::time::Duration;

type EventStream = BoxStream<'static, Result<Sse, sse_stream::Error>>;

fn initialize_request(id: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "mcp-bridge-integration-tests", "version": "0" }
        }
    })
}

fn initialized_notification() -> Value {
    json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
}

/// Minimal MCP client for a tool server's streamable HTTP endpoint (`/mcp/{id}/mcp`).
pub struct McpStreamableHttpSession {
    client: reqwest::Client,
    endpoint: String,
    session_id: String,
}

impl McpStreamableHttpSession {
    pub async fn connect(endpoint: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::new();
        let endpoint = endpoint.to_string();

        let init_resp = post_mcp(&client, &endpoint, None, initialize_request(0)).await?;
        let session_id = init_resp
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|h| h.to_str().ok())
            .context("missing Mcp-Session-Id header")?
            .to_string();

        let init_msg = read_response(init_resp, 0).await?;
        anyhow::ensure!(
            init_msg["result"]["capabilities"]["tools"].is_object(),
            "initialize result does not advertise tools: {init_msg}"
        );

        let initialized_resp = post_mcp(
            &client,
            &endpoint,
            Some(&session_id),
            initialized_notification(),
        )
        .await?;
        anyhow::ensure!(
            initialized_resp.status().as_u16() == 202,
            "notifications/initialized returned {}",
            initialized_resp.status()
        );

        Ok(Self {
            client,
            endpoint,
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn request(
        &self,
        id: u64,
        method: &str,
        params: Value,
        timeout_dur: Duration,
    ) -> anyhow::Result<Value> {
        let resp = post_mcp(
            &self.client,
            &self.endpoint,
            Some(&self.session_id),
            json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }),
        )
        .await?;

        tokio::time::timeout(timeout_dur, read_response(resp, id))
            .await
            .context("timeout waiting for event-stream response")?
    }
}

async fn post_mcp(
    client: &reqwest::Client,
    endpoint: &str,
    session_id: Option<&str>,
    body: Value,
) -> anyhow::Result<reqwest::Response> {
    let mut req = client
        .post(endpoint)
        .header("Accept", "application/json, text/event-stream")
        .header("Content-Type", "application/json")
        .json(&body);

    if let Some(session_id) = session_id {
        req = req.header("Mcp-Session-Id", session_id);
    }

    req.send()
        .await
        .context("POST streamable endpoint")?
        .error_for_status()
        .context("POST streamable endpoint status")
}

/// Read JSON-RPC messages off a response event stream until the one answering `id`.
async fn read_response(resp: reqwest::Response, id: u64) -> anyhow::Result<Value> {
    let mut events: EventStream = SseStream::from_byte_stream(resp.bytes_stream()).boxed();
    while let Some(event) = events.next().await {
        let Some(msg) = json_data(&event?) else {
            continue;
        };
        if msg.get("id") == Some(&json!(id)) {
            return Ok(msg);
        }
    }
    anyhow::bail!("event-stream ended without a response to id {id}")
}

fn json_data(event: &Sse) -> Option<Value> {
    let data = event.data.as_deref()?;
    if data.trim().is_empty() {
        return None;
    }
    serde_json::from_str(data).ok()
}

/// MCP client for a tool server's SSE endpoint (`/mcp/{id}/sse` + `/mcp/{id}/message`).
pub struct McpSseSession {
    client: reqwest::Client,
    events: EventStream,
    message_url: String,
    pending: VecDeque<Value>,
}

impl McpSseSession {
    /// Open the stream and read the `endpoint` event. No MCP traffic yet.
    pub async fn open(sse_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::new();
        let resp = client
            .get(sse_url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .context("GET sse")?
            .error_for_status()
            .context("GET sse status")?;
        let mut events: EventStream = SseStream::from_byte_stream(resp.bytes_stream()).boxed();

        let message_url = loop {
            let event = tokio::time::timeout(Duration::from_secs(10), events.next())
                .await
                .context("timeout waiting for endpoint event")?
                .context("sse stream ended before endpoint event")??;
            if event.event.as_deref() == Some("endpoint") {
                break event.data.context("endpoint event without data")?;
            }
        };

        Ok(Self {
            client,
            events,
            message_url,
            pending: VecDeque::new(),
        })
    }

    /// Open the stream and run the initialize handshake.
    pub async fn connect(sse_url: &str) -> anyhow::Result<Self> {
        let mut session = Self::open(sse_url).await?;
        let init = session
            .request_raw(initialize_request(0), 0, Duration::from_secs(10))
            .await?;
        anyhow::ensure!(
            init["result"]["capabilities"]["tools"].is_object(),
            "initialize result does not advertise tools: {init}"
        );
        let status = session.post(initialized_notification()).await?;
        anyhow::ensure!(status == 202, "notifications/initialized returned {status}");
        Ok(session)
    }

    pub fn message_url(&self) -> &str {
        &self.message_url
    }

    pub async fn post(&self, body: Value) -> anyhow::Result<u16> {
        let resp = self
            .client
            .post(&self.message_url)
            .json(&body)
            .send()
            .await
            .context("POST message")?;
        Ok(resp.status().as_u16())
    }

    /// Next JSON-RPC message from the stream (buffered ones first).
    pub async fn next_message(&mut self, timeout_dur: Duration) -> anyhow::Result<Option<Value>> {
        if let Some(msg) = self.pending.pop_front() {
            return Ok(Some(msg));
        }
        let read = async {
            while let Some(event) = self.events.next().await {
                let event = event?;
                if event.event.as_deref().unwrap_or("message") != "message" {
                    continue;
                }
                if let Some(msg) = json_data(&event) {
                    return Ok(Some(msg));
                }
            }
            Ok::<_, anyhow::Error>(None)
        };
        tokio::time::timeout(timeout_dur, read)
            .await
            .context("timeout waiting for sse message")?
    }

    async fn request_raw(
        &mut self,
        body: Value,
        id: u64,
        timeout_dur: Duration,
    ) -> anyhow::Result<Value> {
        let status = self.post(body).await?;
        anyhow::ensure!(status == 202, "message POST returned {status}");

        let mut skipped = Vec::new();
        let result = loop {
            let msg = self
                .next_message(timeout_dur)
                .await?
                .context("sse stream ended before response")?;
            if msg.get("id") == Some(&json!(id)) && msg.get("method").is_none() {
                break msg;
            }
            skipped.push(msg);
        };
        self.pending.extend(skipped);
        Ok(result)
    }

    pub async fn request(
        &mut self,
        id: u64,
        method: &str,
        params: Value,
        timeout_dur: Duration,
    ) -> anyhow::Result<Value> {
        self.request_raw(
            json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }),
            id,
            timeout_dur,
        )
        .await
    }

    /// Wait for a notification with `method`, dropping other messages.
    pub async fn wait_for_notification(
        &mut self,
        method: &str,
        timeout_dur: Duration,
    ) -> anyhow::Result<Value> {
        loop {
            let msg = self
                .next_message(timeout_dur)
                .await?
                .context("sse stream ended before notification")?;
            if msg.get("method").and_then(Value::as_str) == Some(method) {
                return Ok(msg);
            }
        }
    }
}

/// Names from a `tools/list` response.
pub fn tool_names(msg: &Value) -> anyhow::Result<Vec<String>> {
    let tools = msg["result"]["tools"]
        .as_array()
        .context("tools/list missing result.tools")?;
    let mut names: Vec<String> = tools
        .iter()
        .filter_map(|t| t["name"].as_str().map(str::to_string))
        .collect();
    names.sort();
    Ok(names)
}

/// The echo server's description of the request a tool call made.
pub fn echoed_request(msg: &Value) -> anyhow::Result<Value> {
    let result = msg.get("result").context("tools/call missing result")?;
    anyhow::ensure!(
        result.get("isError") != Some(&json!(true)),
        "tool call failed: {result}"
    );
    let text = result["content"][0]["text"]
        .as_str()
        .context("tools/call missing result.content[0].text")?;
    serde_json::from_str(text).context("tools/call text is not JSON")
}
