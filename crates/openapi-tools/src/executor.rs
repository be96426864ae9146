//! Turning one `OpenAPI` operation into an invocable tool.
//!
//! A [`Callable`] never fails: every problem met while building, sending or reading the request
//! is reported back as an error-flagged [`CallToolResult`] so the MCP session stays healthy.

use crate::document::{OpenApiDocument, OperationSpec};
use crate::error::{OpenApiToolsError, Result};
use crate::selector::BaseUrlSelector;
use mcp_bridge_http_tools::auth::AuthConfig;
use mcp_bridge_http_tools::client::ClientSettings;
use mcp_bridge_http_tools::error::HttpToolsError;
use mcp_bridge_http_tools::safety::redact_url;
use mcp_bridge_http_tools::semantics::annotations_for_operation;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Shared outbound client plus base URL policy. One per process.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: Client,
    selector: Arc<dyn BaseUrlSelector>,
}

impl Dispatcher {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &ClientSettings, selector: Arc<dyn BaseUrlSelector>) -> Result<Self> {
        Ok(Self {
            client: settings.build_client()?,
            selector,
        })
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Parse a document using this dispatcher's client for remote `$ref`s.
    ///
    /// # Errors
    ///
    /// See [`OpenApiDocument::parse`].
    pub async fn parse_document(&self, raw: &str) -> Result<OpenApiDocument> {
        OpenApiDocument::parse(raw, &self.client).await
    }

    /// Build the callable for `operation_id`, capturing `auth` for every future call.
    ///
    /// # Errors
    ///
    /// Fails if the operation does not exist or the auth config is invalid.
    pub fn build_callable(
        &self,
        doc: &OpenApiDocument,
        operation_id: &str,
        auth: AuthConfig,
    ) -> Result<Callable> {
        auth.validate()?;
        let operation = doc
            .find_operation(operation_id)
            .cloned()
            .ok_or_else(|| OpenApiToolsError::OperationNotFound(operation_id.to_string()))?;

        Ok(Callable {
            operation,
            servers: doc.servers().into(),
            auth,
            client: self.client.clone(),
            selector: Arc::clone(&self.selector),
        })
    }
}

#[derive(Debug)]
pub struct Callable {
    operation: Arc<OperationSpec>,
    servers: Arc<[String]>,
    auth: AuthConfig,
    client: Client,
    selector: Arc<dyn BaseUrlSelector>,
}

impl Callable {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.operation.operation_id
    }

    #[must_use]
    pub fn description(&self) -> &str {
        self.operation.tool_description()
    }

    #[must_use]
    pub fn operation(&self) -> &OperationSpec {
        &self.operation
    }

    #[must_use]
    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    /// MCP tool descriptor advertised for this callable.
    #[must_use]
    pub fn tool(&self) -> Tool {
        let mut tool = Tool::new(
            self.name().to_string(),
            self.description().to_string(),
            Arc::clone(&self.operation.input_schema),
        );
        tool.annotations = Some(annotations_for_operation(
            &self.operation.method,
            self.operation.summary.as_deref(),
        ));
        tool
    }

    pub async fn call(&self, arguments: &JsonObject) -> CallToolResult {
        self.call_with_cancel(arguments, &CancellationToken::new())
            .await
    }

    /// Invoke the operation. Cancelling `ct` drops the in-flight request.
    pub async fn call_with_cancel(
        &self,
        arguments: &JsonObject,
        ct: &CancellationToken,
    ) -> CallToolResult {
        let outcome = tokio::select! {
            biased;
            () = ct.cancelled() => Err(HttpToolsError::Transport("call cancelled".to_string())),
            r = self.dispatch(arguments) => r,
        };

        match outcome {
            Ok(body) => CallToolResult::success(vec![Content::text(body)]),
            Err(e) => {
                tracing::warn!(tool = %self.name(), error = %e, "tool call failed");
                let mut message = e.to_string();
                if message.trim().is_empty() {
                    message = format!("call to '{}' failed", self.name());
                }
                CallToolResult::error(vec![Content::text(message)])
            }
        }
    }

    async fn dispatch(&self, arguments: &JsonObject) -> std::result::Result<String, HttpToolsError> {
        let base = self
            .selector
            .select(&self.servers)
            .ok_or_else(|| HttpToolsError::Request("no server url available".to_string()))?;

        let binding = self.operation.bind(arguments);
        let mut url = Url::parse(&format!("{}{}", base.trim_end_matches('/'), binding.path))
            .map_err(|e| HttpToolsError::Request(format!("invalid request url: {e}")))?;
        if !binding.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &binding.query {
                pairs.append_pair(name, value);
            }
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &binding.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| HttpToolsError::Request(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                HttpToolsError::Request(format!("invalid value for header '{name}': {e}"))
            })?;
            headers.insert(name, value);
        }

        self.auth.apply_to_url(&mut url);
        self.auth.apply_to_headers(&mut headers)?;

        tracing::debug!(
            tool = %self.name(),
            method = %self.operation.method,
            url = %redact_url(&url),
            "dispatching tool call"
        );

        let mut request = self
            .client
            .request(self.operation.method.clone(), url)
            .headers(headers);
        if let Some(body) = &binding.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::BaseUrlStrategy;
    use mcp_bridge_test_support::spawn_echo_server;
    use serde_json::{Value, json};
    use std::time::Duration;

    fn users_doc(server: &str) -> String {
        format!(
            r#"
openapi: 3.0.3
info: {{ title: users, version: "1" }}
servers:
  - url: {server}
paths:
  /users/{{id}}:
    get:
      operationId: getUser
      summary: Get a user
      parameters:
        - {{ name: id, in: path, required: true, schema: {{ type: integer }} }}
        - {{ name: fields, in: query, schema: {{ type: string }} }}
        - {{ name: X-Trace, in: header, schema: {{ type: string }} }}
      responses: {{ "200": {{ description: ok }} }}
  /users:
    post:
      operationId: createUser
      requestBody:
        content:
          application/json:
            schema: {{ type: object }}
      responses: {{ "201": {{ description: created }} }}
"#
        )
    }

    async fn dispatcher_and_doc(server: &str) -> (Dispatcher, OpenApiDocument) {
        let dispatcher =
            Dispatcher::new(&ClientSettings::default(), BaseUrlStrategy::Random.selector())
                .expect("dispatcher");
        let doc = dispatcher
            .parse_document(&users_doc(server))
            .await
            .expect("parse");
        (dispatcher, doc)
    }

    fn args(v: Value) -> JsonObject {
        v.as_object().cloned().unwrap_or_default()
    }

    fn text_of(result: &CallToolResult) -> String {
        result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default()
    }

    fn echoed(result: &CallToolResult) -> Value {
        assert_ne!(result.is_error, Some(true), "{}", text_of(result));
        serde_json::from_str(&text_of(result)).expect("echo json")
    }

    #[tokio::test]
    async fn get_without_auth_sends_no_body_or_auth_header() {
        let echo = spawn_echo_server().await.expect("echo");
        let (dispatcher, doc) = dispatcher_and_doc(echo.base_url()).await;
        let callable = dispatcher
            .build_callable(&doc, "getUser", AuthConfig::None)
            .expect("callable");

        let out = echoed(&callable.call(&args(json!({"id": 7}))).await);
        assert_eq!(out["method"], json!("GET"));
        assert_eq!(out["path"], json!("/users/7"));
        assert_eq!(out["query"], json!(""));
        assert_eq!(out["body"], json!(""));
        assert!(out["headers"].get("x-key").is_none());
    }

    #[tokio::test]
    async fn header_api_key_is_injected() {
        let echo = spawn_echo_server().await.expect("echo");
        let (dispatcher, doc) = dispatcher_and_doc(echo.base_url()).await;
        let callable = dispatcher
            .build_callable(
                &doc,
                "getUser",
                AuthConfig::api_key_header("X-Key", "secret123"),
            )
            .expect("callable");

        let out = echoed(
            &callable
                .call(&args(json!({"id": 7, "fields": "a b", "X-Trace": 9})))
                .await,
        );
        assert_eq!(out["path"], json!("/users/7"));
        assert_eq!(out["query"], json!("fields=a+b"));
        assert_eq!(out["headers"]["x-key"], json!("secret123"));
        assert_eq!(out["headers"]["x-trace"], json!("9"));
    }

    #[tokio::test]
    async fn query_api_key_is_appended_after_declared_params() {
        let echo = spawn_echo_server().await.expect("echo");
        let (dispatcher, doc) = dispatcher_and_doc(echo.base_url()).await;
        let callable = dispatcher
            .build_callable(&doc, "getUser", AuthConfig::api_key_query("api_key", "k&1"))
            .expect("callable");

        let out = echoed(&callable.call(&args(json!({"id": 1, "fields": "x"}))).await);
        assert_eq!(out["query"], json!("fields=x&api_key=k%261"));
    }

    #[tokio::test]
    async fn request_body_object_is_sent_as_json() {
        let echo = spawn_echo_server().await.expect("echo");
        let (dispatcher, doc) = dispatcher_and_doc(echo.base_url()).await;
        let callable = dispatcher
            .build_callable(&doc, "createUser", AuthConfig::None)
            .expect("callable");
        assert_eq!(
            callable.tool().input_schema["required"],
            json!(["requestBody"])
        );

        let out = echoed(
            &callable
                .call(&args(json!({"requestBody": {"name": "ann"}})))
                .await,
        );
        assert_eq!(out["method"], json!("POST"));
        assert_eq!(out["headers"]["content-type"], json!("application/json"));
        let body: Value = serde_json::from_str(out["body"].as_str().expect("body")).expect("json");
        assert_eq!(body, json!({"name": "ann"}));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_soft_error() {
        let (dispatcher, doc) = dispatcher_and_doc("http://127.0.0.1:1").await;
        let callable = dispatcher
            .build_callable(&doc, "getUser", AuthConfig::None)
            .expect("callable");

        let result = callable.call(&args(json!({"id": 1}))).await;
        assert_eq!(result.is_error, Some(true));
        assert!(!text_of(&result).trim().is_empty());
    }

    #[tokio::test]
    async fn cancelled_call_is_a_soft_error() {
        let (dispatcher, doc) = dispatcher_and_doc("http://127.0.0.1:1").await;
        let callable = dispatcher
            .build_callable(&doc, "getUser", AuthConfig::None)
            .expect("callable");
        let ct = CancellationToken::new();
        ct.cancel();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            callable.call_with_cancel(&args(json!({"id": 1})), &ct),
        )
        .await
        .expect("returns promptly");
        assert_eq!(result.is_error, Some(true));
        assert!(text_of(&result).contains("cancelled"));
    }

    #[tokio::test]
    async fn build_fails_on_unknown_operation_or_bad_auth() {
        let (dispatcher, doc) = dispatcher_and_doc("http://127.0.0.1:1").await;
        assert!(matches!(
            dispatcher.build_callable(&doc, "nope", AuthConfig::None),
            Err(OpenApiToolsError::OperationNotFound(_))
        ));
        assert!(matches!(
            dispatcher.build_callable(&doc, "getUser", AuthConfig::api_key_header("X-Key", "")),
            Err(OpenApiToolsError::Http(_))
        ));
    }

    #[tokio::test]
    async fn tool_descriptor_carries_schema_and_annotations() {
        let (dispatcher, doc) = dispatcher_and_doc("http://127.0.0.1:1").await;
        let tool = dispatcher
            .build_callable(&doc, "getUser", AuthConfig::None)
            .expect("callable")
            .tool();
        assert_eq!(tool.name, "getUser");
        assert_eq!(tool.description.as_deref(), Some("Get a user"));
        assert_eq!(tool.input_schema["required"], json!(["id"]));
        let annotations = tool.annotations.expect("annotations");
        assert_eq!(annotations.read_only_hint, Some(true));
        assert_eq!(annotations.title.as_deref(), Some("Get a user"));
    }
}
