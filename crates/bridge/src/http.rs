//! Axum surface: MCP transports per tool server plus the admin API.

use crate::error::{BridgeError, ErrorKey, RegistryError};
use crate::schema_builder::{ToolInfo, ToolUpdate};
use crate::service::{BridgeService, CreateServerRequest};
use crate::sse::SESSION_ID_PARAM;
use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{Path, Query},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, delete, get, post, put},
};
use rmcp::model::ClientJsonRpcMessage;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorKey,
    message: String,
}

fn error_response(status: StatusCode, key: ErrorKey, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: key,
            message: message.into(),
        }),
    )
        .into_response()
}

fn status_for(key: ErrorKey) -> StatusCode {
    match key {
        ErrorKey::McpServerNotExist
        | ErrorKey::McpServerToolNotExist
        | ErrorKey::McpServerCustomToolNotExist
        | ErrorKey::McpSessionNotExist => StatusCode::NOT_FOUND,
        ErrorKey::McpServerStartErr => StatusCode::CONFLICT,
        ErrorKey::McpServerConvertToolErr
        | ErrorKey::McpServerToolTypeUnknown
        | ErrorKey::McpServerConfigErr => StatusCode::BAD_REQUEST,
        ErrorKey::McpServerShutdownErr
        | ErrorKey::McpServerRegisterToolErr
        | ErrorKey::McpServerUnregisterToolErr
        | ErrorKey::McpServerStoreErr => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let key = self.key();
        let status = match &self {
            BridgeError::Registry {
                source: RegistryError::ToolNameTaken { .. },
                ..
            } => StatusCode::CONFLICT,
            _ => status_for(key),
        };
        if status.is_server_error() {
            tracing::error!(error = %self, %key, "request failed");
        } else {
            tracing::debug!(error = %self, %key, "request rejected");
        }
        error_response(status, key, self.to_string())
    }
}

fn server_not_found(server_id: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        ErrorKey::McpServerNotExist,
        format!("tool server '{server_id}' does not exist"),
    )
}

pub fn router(service: BridgeService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/mcp/{server_id}/sse", get(sse_connect))
        .route("/mcp/{server_id}/message", post(sse_message))
        .route("/mcp/{server_id}/mcp", any(streamable))
        .route("/admin/v1/servers", post(create_server))
        .route("/admin/v1/servers/{server_id}", delete(delete_server))
        .route(
            "/admin/v1/servers/{server_id}/tools",
            get(list_tools).post(create_tools),
        )
        .route("/admin/v1/tools/{tool_id}", put(update_tool).delete(delete_tool))
        .layer(Extension(service))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn sse_connect(
    Extension(service): Extension<BridgeService>,
    Path(server_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    match service.registry().lookup_sse(&server_id) {
        Some(endpoint) => endpoint.connect(&query),
        None => server_not_found(&server_id),
    }
}

async fn sse_message(
    Extension(service): Extension<BridgeService>,
    Path(server_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(message): Json<ClientJsonRpcMessage>,
) -> Response {
    let Some(endpoint) = service.registry().lookup_sse(&server_id) else {
        return server_not_found(&server_id);
    };
    let Some(session_id) = query.get(SESSION_ID_PARAM) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorKey::McpSessionNotExist,
            format!("missing {SESSION_ID_PARAM} query parameter"),
        );
    };
    if endpoint.post_message(session_id, message).await {
        StatusCode::ACCEPTED.into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            ErrorKey::McpSessionNotExist,
            format!("session '{session_id}' does not exist"),
        )
    }
}

async fn streamable(
    Extension(service): Extension<BridgeService>,
    Path(server_id): Path<String>,
    req: Request<Body>,
) -> Response {
    match service.registry().lookup_streamable(&server_id) {
        Some(endpoint) => endpoint.handle(req).await,
        None => server_not_found(&server_id),
    }
}

async fn create_server(
    Extension(service): Extension<BridgeService>,
    Json(req): Json<CreateServerRequest>,
) -> Result<Response, BridgeError> {
    let record = service.create_server(req).await?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

async fn delete_server(
    Extension(service): Extension<BridgeService>,
    Path(server_id): Path<String>,
) -> Result<StatusCode, BridgeError> {
    service.delete_server(&server_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_tools(
    Extension(service): Extension<BridgeService>,
    Path(server_id): Path<String>,
) -> Result<Response, BridgeError> {
    let tools = service.list_tools(&server_id).await?;
    Ok(Json(tools).into_response())
}

async fn create_tools(
    Extension(service): Extension<BridgeService>,
    Path(server_id): Path<String>,
    Json(info): Json<ToolInfo>,
) -> Result<Response, BridgeError> {
    let records = service.create_tools(&server_id, &info).await?;
    Ok((StatusCode::CREATED, Json(records)).into_response())
}

async fn update_tool(
    Extension(service): Extension<BridgeService>,
    Path(tool_id): Path<String>,
    Json(mut update): Json<ToolUpdate>,
) -> Result<Response, BridgeError> {
    update.tool_record_id.clone_from(&tool_id);
    let record = service.update_tool(&tool_id, &update).await?;
    Ok(Json(record).into_response())
}

async fn delete_tool(
    Extension(service): Extension<BridgeService>,
    Path(tool_id): Path<String>,
) -> Result<StatusCode, BridgeError> {
    service.delete_tool(&tool_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
