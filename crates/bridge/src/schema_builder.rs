//! Turning tool definitions into registrable tools and persistable records.
//!
//! A [`SchemaBuilder`] knows where the OpenAPI document and the API key of one provenance come
//! from. [`SchemaBuilderRegistry`] picks the builder by tool type, parses the document once and
//! produces one [`ToolDescriptor`] plus one [`ToolRecord`] per requested operation.

use crate::error::{BridgeError, Result};
use crate::store::{CustomToolAuth, CustomToolLookup, ToolRecord};
use crate::tools::ToolDescriptor;
use async_trait::async_trait;
use mcp_bridge_http_tools::auth::{ApiAuthRecord, ApiKeyLocation, AuthConfig};
use mcp_bridge_openapi::{Dispatcher, OpenApiDocument};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

pub const CUSTOM_TOOL_TYPE: &str = "custom";
pub const OPENAPI_TOOL_TYPE: &str = "openapi";

/// A tool creation request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Custom tool id (`custom` only).
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Operation ids to expose. Empty means every operation of the document.
    #[serde(default)]
    pub method_names: Vec<String>,
    /// Inline OpenAPI document (`openapi` only).
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub api_auth: CustomToolAuth,
}

/// What a builder resolves a [`ToolInfo`] to.
#[derive(Debug, Clone)]
pub struct OpenApiSchema {
    pub name: String,
    pub schema: String,
    pub auth: ApiAuthRecord,
    pub method_names: Vec<String>,
}

/// Rename/re-describe request for an existing tool record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUpdate {
    #[serde(default)]
    pub tool_record_id: String,
    pub method_name: String,
    #[serde(default, alias = "desc")]
    pub description: String,
}

#[derive(Debug)]
pub struct McpSchema {
    pub tools: Vec<ToolDescriptor>,
    pub records: Vec<ToolRecord>,
}

#[async_trait]
pub trait SchemaBuilder: Send + Sync {
    fn tool_type(&self) -> &'static str;

    async fn build(&self, info: &ToolInfo) -> Result<OpenApiSchema>;
}

/// Stored API keys are always sent as a header.
fn header_auth(auth: &CustomToolAuth) -> ApiAuthRecord {
    ApiAuthRecord {
        auth_type: auth.auth_type.clone(),
        auth_in: ApiKeyLocation::Header.as_str().to_string(),
        auth_name: auth.custom_header_name.clone(),
        auth_value: auth.api_key.clone(),
    }
}

/// Tools backed by an entry of the custom-tool catalog.
pub struct CustomToolSchemaBuilder {
    lookup: Arc<dyn CustomToolLookup>,
}

impl CustomToolSchemaBuilder {
    #[must_use]
    pub fn new(lookup: Arc<dyn CustomToolLookup>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl SchemaBuilder for CustomToolSchemaBuilder {
    fn tool_type(&self) -> &'static str {
        CUSTOM_TOOL_TYPE
    }

    async fn build(&self, info: &ToolInfo) -> Result<OpenApiSchema> {
        let custom = self
            .lookup
            .get_custom_tool(&info.id)
            .await?
            .ok_or_else(|| BridgeError::CustomToolNotFound(info.id.clone()))?;
        Ok(OpenApiSchema {
            name: custom.name.clone(),
            schema: custom.schema.clone(),
            auth: header_auth(&custom.auth),
            method_names: info.method_names.clone(),
        })
    }
}

/// Tools whose document and auth come with the request.
#[derive(Debug, Default)]
pub struct OpenApiToolSchemaBuilder;

#[async_trait]
impl SchemaBuilder for OpenApiToolSchemaBuilder {
    fn tool_type(&self) -> &'static str {
        OPENAPI_TOOL_TYPE
    }

    async fn build(&self, info: &ToolInfo) -> Result<OpenApiSchema> {
        Ok(OpenApiSchema {
            name: info.name.clone(),
            schema: info.schema.clone(),
            auth: header_auth(&info.api_auth),
            method_names: info.method_names.clone(),
        })
    }
}

pub struct SchemaBuilderRegistry {
    builders: HashMap<&'static str, Arc<dyn SchemaBuilder>>,
    dispatcher: Arc<Dispatcher>,
}

impl SchemaBuilderRegistry {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            builders: HashMap::new(),
            dispatcher,
        }
    }

    /// Registry with the `custom` and `openapi` builders.
    #[must_use]
    pub fn with_default_builders(
        dispatcher: Arc<Dispatcher>,
        lookup: Arc<dyn CustomToolLookup>,
    ) -> Self {
        Self::new(dispatcher)
            .with_builder(Arc::new(CustomToolSchemaBuilder::new(lookup)))
            .with_builder(Arc::new(OpenApiToolSchemaBuilder))
    }

    #[must_use]
    pub fn with_builder(mut self, builder: Arc<dyn SchemaBuilder>) -> Self {
        self.builders.insert(builder.tool_type(), builder);
        self
    }

    #[must_use]
    pub fn tool_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.builders.keys().copied().collect();
        types.sort_unstable();
        types
    }

    async fn parse(&self, raw: &str) -> Result<OpenApiDocument> {
        Ok(self.dispatcher.parse_document(raw).await?)
    }

    fn descriptor(
        &self,
        doc: &OpenApiDocument,
        operation_id: &str,
        auth: &ApiAuthRecord,
    ) -> Result<ToolDescriptor> {
        let auth = AuthConfig::try_from(auth)?;
        let callable = self.dispatcher.build_callable(doc, operation_id, auth)?;
        Ok(ToolDescriptor::new(callable))
    }

    /// Build tools and records for a new tool of `server_id`. Nothing is registered or stored.
    pub async fn create_mcp_schema(&self, server_id: &str, info: &ToolInfo) -> Result<McpSchema> {
        let builder = self
            .builders
            .get(info.tool_type.as_str())
            .ok_or_else(|| BridgeError::UnknownToolType(info.tool_type.clone()))?;
        let built = builder.build(info).await?;
        let doc = self.parse(&built.schema).await?;

        let method_names: Vec<String> = if built.method_names.is_empty() {
            doc.operations()
                .iter()
                .map(|op| op.operation_id.clone())
                .collect()
        } else {
            built.method_names.clone()
        };

        let mut tools = Vec::with_capacity(method_names.len());
        let mut records = Vec::with_capacity(method_names.len());
        for method in &method_names {
            let descriptor = self.descriptor(&doc, method, &built.auth)?;
            records.push(ToolRecord {
                id: uuid::Uuid::new_v4().to_string(),
                server_id: server_id.to_string(),
                app_tool_id: info.id.clone(),
                tool_type: info.tool_type.clone(),
                app_tool_name: built.name.clone(),
                tool_name: descriptor.name().to_string(),
                description: descriptor.callable().description().to_string(),
                schema: doc.extract_single_operation(method)?,
                auth: built.auth.clone(),
            });
            tools.push(descriptor);
        }

        tracing::debug!(server_id, tool_type = %info.tool_type, count = tools.len(), "built tool schema");
        Ok(McpSchema { tools, records })
    }

    /// Rebuild `existing` with a new operation id and description, keeping its stored auth.
    pub async fn update_mcp_schema(
        &self,
        update: &ToolUpdate,
        existing: &ToolRecord,
    ) -> Result<McpSchema> {
        let doc = self.parse(&existing.schema).await?;
        let renamed =
            doc.with_renamed_operation(&existing.tool_name, &update.method_name, &update.description)?;
        let method = update.method_name.trim();
        let descriptor = self.descriptor(&renamed, method, &existing.auth)?;

        let record = ToolRecord {
            tool_name: method.to_string(),
            description: update.description.clone(),
            schema: renamed.extract_single_operation(method)?,
            ..existing.clone()
        };
        Ok(McpSchema {
            tools: vec![descriptor],
            records: vec![record],
        })
    }

    /// Rebuild the tool of a persisted record.
    pub async fn rebuild_tool(&self, record: &ToolRecord) -> Result<ToolDescriptor> {
        let doc = self.parse(&record.schema).await?;
        self.descriptor(&doc, &record.tool_name, &record.auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CustomToolRecord, MemoryStore, StoreSnapshot};
    use mcp_bridge_http_tools::auth::API_KEY_AUTH_TYPE;
    use mcp_bridge_http_tools::client::ClientSettings;
    use mcp_bridge_openapi::BaseUrlStrategy;

    const DOC: &str = r#"
openapi: 3.0.0
info: { title: t, version: "1" }
servers: [ { url: "http://127.0.0.1:9" } ]
paths:
  /users/{id}:
    get:
      operationId: getUser
      summary: Fetch a user
      parameters:
        - { name: id, in: path, required: true, schema: { type: integer } }
      responses: { "200": { description: ok } }
  /users:
    post:
      operationId: createUser
      responses: { "200": { description: ok } }
"#;

    fn registry(custom: Vec<CustomToolRecord>) -> SchemaBuilderRegistry {
        let dispatcher = Arc::new(
            Dispatcher::new(
                &ClientSettings::default(),
                BaseUrlStrategy::default().selector(),
            )
            .unwrap(),
        );
        let store = Arc::new(MemoryStore::new(StoreSnapshot {
            custom_tools: custom,
            ..StoreSnapshot::default()
        }));
        SchemaBuilderRegistry::with_default_builders(dispatcher, store)
    }

    fn api_key() -> CustomToolAuth {
        CustomToolAuth {
            auth_type: API_KEY_AUTH_TYPE.to_string(),
            custom_header_name: "X-Key".to_string(),
            api_key: "secret123".to_string(),
        }
    }

    #[tokio::test]
    async fn openapi_builder_builds_requested_operations() {
        let registry = registry(vec![]);
        let info = ToolInfo {
            tool_type: OPENAPI_TOOL_TYPE.to_string(),
            name: "users".to_string(),
            method_names: vec!["getUser".to_string()],
            schema: DOC.to_string(),
            api_auth: api_key(),
            ..ToolInfo::default()
        };
        let schema = registry.create_mcp_schema("s1", &info).await.unwrap();
        assert_eq!(schema.tools.len(), 1);
        assert_eq!(schema.tools[0].name(), "getUser");

        let record = &schema.records[0];
        assert_eq!(record.server_id, "s1");
        assert_eq!(record.tool_name, "getUser");
        assert_eq!(record.app_tool_name, "users");
        assert_eq!(record.description, "Fetch a user");
        assert_eq!(record.auth.auth_in, "header");
        assert_eq!(record.auth.auth_name, "X-Key");

        let rebuilt = registry.rebuild_tool(record).await.unwrap();
        assert_eq!(rebuilt.name(), "getUser");
        assert_eq!(
            rebuilt.callable().auth(),
            &AuthConfig::api_key_header("X-Key", "secret123")
        );
    }

    #[tokio::test]
    async fn empty_method_list_takes_every_operation() {
        let registry = registry(vec![]);
        let info = ToolInfo {
            tool_type: OPENAPI_TOOL_TYPE.to_string(),
            schema: DOC.to_string(),
            ..ToolInfo::default()
        };
        let schema = registry.create_mcp_schema("s1", &info).await.unwrap();
        let mut names: Vec<&str> = schema.tools.iter().map(ToolDescriptor::name).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["createUser", "getUser"]);
    }

    #[tokio::test]
    async fn custom_builder_uses_catalog_entry() {
        let registry = registry(vec![CustomToolRecord {
            id: "c1".to_string(),
            name: "user api".to_string(),
            schema: DOC.to_string(),
            auth: api_key(),
        }]);
        let info = ToolInfo {
            tool_type: CUSTOM_TOOL_TYPE.to_string(),
            id: "c1".to_string(),
            method_names: vec!["createUser".to_string()],
            ..ToolInfo::default()
        };
        let schema = registry.create_mcp_schema("s1", &info).await.unwrap();
        assert_eq!(schema.records[0].app_tool_id, "c1");
        assert_eq!(schema.records[0].app_tool_name, "user api");
        assert_eq!(schema.records[0].tool_type, CUSTOM_TOOL_TYPE);

        let missing = ToolInfo {
            id: "c2".to_string(),
            ..info
        };
        let err = registry.create_mcp_schema("s1", &missing).await.unwrap_err();
        assert!(matches!(err, BridgeError::CustomToolNotFound(id) if id == "c2"));
    }

    #[tokio::test]
    async fn unknown_type_and_operation_fail() {
        let registry = registry(vec![]);
        let err = registry
            .create_mcp_schema(
                "s1",
                &ToolInfo {
                    tool_type: "workflow".to_string(),
                    ..ToolInfo::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownToolType(_)));

        let err = registry
            .create_mcp_schema(
                "s1",
                &ToolInfo {
                    tool_type: OPENAPI_TOOL_TYPE.to_string(),
                    schema: DOC.to_string(),
                    method_names: vec!["deleteUser".to_string()],
                    ..ToolInfo::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Convert(_)));
    }

    #[tokio::test]
    async fn update_renames_and_keeps_auth() {
        let registry = registry(vec![]);
        let info = ToolInfo {
            tool_type: OPENAPI_TOOL_TYPE.to_string(),
            schema: DOC.to_string(),
            method_names: vec!["getUser".to_string()],
            api_auth: api_key(),
            ..ToolInfo::default()
        };
        let created = registry.create_mcp_schema("s1", &info).await.unwrap();
        let existing = &created.records[0];

        let update = ToolUpdate {
            tool_record_id: existing.id.clone(),
            method_name: "fetchUser".to_string(),
            description: "Load one user".to_string(),
        };
        let updated = registry.update_mcp_schema(&update, existing).await.unwrap();
        let record = &updated.records[0];
        assert_eq!(record.id, existing.id);
        assert_eq!(record.tool_name, "fetchUser");
        assert_eq!(record.description, "Load one user");
        assert_eq!(record.auth, existing.auth);
        assert_eq!(updated.tools[0].name(), "fetchUser");

        let rebuilt = registry.rebuild_tool(record).await.unwrap();
        assert_eq!(rebuilt.callable().description(), "Load one user");
    }

    #[test]
    fn default_builders_cover_both_types() {
        let registry = registry(vec![]);
        assert_eq!(registry.tool_types(), vec!["custom", "openapi"]);
    }
}
