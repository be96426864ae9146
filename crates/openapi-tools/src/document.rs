//! Parsed and validated `OpenAPI` documents.
//!
//! A document is accepted only if it is usable for dispatch: at least one http(s) server, and a
//! non-empty, document-unique `operationId` on every operation. All `$ref`s needed to describe
//! the operations are resolved while parsing, so an [`OpenApiDocument`] never fails later.

use crate::error::{OpenApiToolsError, Result};
use crate::resolver::{DocId, OpenApiResolver, Resolved};
use crate::schema::{build_input_schema, parameter_schema, schema_ref_to_json};
use openapiv3::{OpenAPI, Operation, Parameter, PathItem, ReferenceOr};
use regex::Regex;
use reqwest::{Client, Method};
use rmcp::model::JsonObject;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, LazyLock};

static SERVER_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https|http)://.+$").expect("valid server url pattern"));

const JSON_MEDIA_TYPE: &str = "application/json";

/// Argument name that carries the JSON request body.
pub const REQUEST_BODY_ARG: &str = "requestBody";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParamLocation {
    fn of(param: &Parameter) -> Self {
        match param {
            Parameter::Path { .. } => ParamLocation::Path,
            Parameter::Query { .. } => ParamLocation::Query,
            Parameter::Header { .. } => ParamLocation::Header,
            Parameter::Cookie { .. } => ParamLocation::Cookie,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    /// JSON Schema for the argument, with `$ref`s expanded.
    pub schema: Value,
}

/// One resolved operation: everything needed to describe it as a tool and to bind a call.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub operation_id: String,
    pub method: Method,
    /// Path template as declared, e.g. `/users/{id}`.
    pub path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    /// Path-item parameters merged with operation parameters (operation wins).
    pub parameters: Vec<ParameterSpec>,
    /// Schema of the `application/json` request body, if declared.
    pub body_schema: Option<Value>,
    pub input_schema: Arc<JsonObject>,
}

/// The concrete pieces of one outbound request, before auth is layered on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallBinding {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl OperationSpec {
    /// Tool description: the operation description, falling back to its summary.
    #[must_use]
    pub fn tool_description(&self) -> &str {
        self.description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .or(self.summary.as_deref())
            .unwrap_or_default()
    }

    /// Bind call arguments onto the declared parameters.
    ///
    /// Path parameters are always substituted (absent or null becomes the empty string); query
    /// and header parameters are only emitted for non-null arguments. Cookie parameters are
    /// described but never sent.
    #[must_use]
    pub fn bind(&self, arguments: &JsonObject) -> CallBinding {
        let mut binding = CallBinding {
            path: self.path.clone(),
            ..CallBinding::default()
        };

        for param in &self.parameters {
            let value = arguments.get(&param.name).filter(|v| !v.is_null());
            match param.location {
                ParamLocation::Path => {
                    let rendered = value.map(value_to_string).unwrap_or_default();
                    binding.path = binding
                        .path
                        .replace(&format!("{{{}}}", param.name), &rendered);
                }
                ParamLocation::Query => {
                    if let Some(v) = value {
                        binding.query.push((param.name.clone(), value_to_string(v)));
                    }
                }
                ParamLocation::Header => {
                    if let Some(v) = value {
                        binding
                            .headers
                            .push((param.name.clone(), value_to_string(v)));
                    }
                }
                ParamLocation::Cookie => {}
            }
        }

        if let Some(body @ Value::Object(_)) = arguments.get(REQUEST_BODY_ARG) {
            binding.body = Some(body.clone());
        }

        if !binding.path.starts_with('/') {
            binding.path.insert(0, '/');
        }
        binding
    }
}

/// Strings as-is, scalars stringified, arrays and objects as compact JSON.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct OpenApiDocument {
    spec: OpenAPI,
    servers: Vec<String>,
    operations: Vec<Arc<OperationSpec>>,
    /// Resolved path items, keyed by path template.
    path_items: BTreeMap<String, PathItem>,
}

impl OpenApiDocument {
    /// Parse a document handed over as a string. Relative file `$ref`s resolve against the
    /// working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or violates a dispatch invariant.
    pub async fn parse(raw: &str, client: &Client) -> Result<Self> {
        // JSON is a subset of YAML.
        let spec: OpenAPI = serde_yaml::from_str(raw).map_err(OpenApiToolsError::Parse)?;
        Self::from_spec(spec, client).await
    }

    async fn from_spec(spec: OpenAPI, client: &Client) -> Result<Self> {
        if !spec.openapi.starts_with("3.") {
            return Err(OpenApiToolsError::UnsupportedVersion(spec.openapi.clone()));
        }

        let servers = validate_servers(&spec)?;
        let resolver = OpenApiResolver::new(&spec, client)?;

        let mut operations = Vec::new();
        let mut path_items = BTreeMap::new();
        let mut seen_ids: HashSet<String> = HashSet::new();

        for (path, item) in &spec.paths.paths {
            let Resolved {
                doc: path_doc,
                value: item,
                ..
            } = resolver.resolve(&DocId::Inline, item).await?;

            for (method, operation) in operations_of(&item) {
                let operation_id = operation
                    .operation_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| OpenApiToolsError::MissingOperationId {
                        method: method.to_string(),
                        path: path.clone(),
                    })?;

                if !seen_ids.insert(operation_id.to_string()) {
                    return Err(OpenApiToolsError::DuplicateOperationId(
                        operation_id.to_string(),
                    ));
                }

                let op = build_operation(
                    &resolver,
                    &path_doc,
                    OperationSource {
                        path,
                        method,
                        operation_id,
                        path_item_params: &item.parameters,
                        operation,
                    },
                )
                .await?;
                operations.push(Arc::new(op));
            }

            path_items.insert(path.clone(), item);
        }

        tracing::debug!(
            operations = operations.len(),
            servers = servers.len(),
            "parsed OpenAPI document"
        );

        Ok(Self {
            spec,
            servers,
            operations,
            path_items,
        })
    }

    #[must_use]
    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    #[must_use]
    pub fn operations(&self) -> &[Arc<OperationSpec>] {
        &self.operations
    }

    #[must_use]
    pub fn find_operation(&self, operation_id: &str) -> Option<&Arc<OperationSpec>> {
        self.operations
            .iter()
            .find(|op| op.operation_id == operation_id)
    }

    /// Standalone JSON document holding only the given operation.
    ///
    /// Servers, components and path-level parameters are kept, so re-parsing the result yields
    /// the same single operation.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::OperationNotFound`] if the id is unknown.
    pub fn extract_single_operation(&self, operation_id: &str) -> Result<String> {
        let op = self
            .find_operation(operation_id)
            .ok_or_else(|| OpenApiToolsError::OperationNotFound(operation_id.to_string()))?;
        let item = self
            .path_items
            .get(&op.path)
            .ok_or_else(|| OpenApiToolsError::OperationNotFound(operation_id.to_string()))?;

        let mut single = PathItem {
            summary: item.summary.clone(),
            description: item.description.clone(),
            servers: item.servers.clone(),
            parameters: item.parameters.clone(),
            ..PathItem::default()
        };
        let operation = operation_slot(item, &op.method)
            .clone()
            .ok_or_else(|| OpenApiToolsError::OperationNotFound(operation_id.to_string()))?;
        *operation_slot_mut(&mut single, &op.method) = Some(operation);

        let mut spec = self.spec.clone();
        spec.paths.paths.retain(|path, _| path == &op.path);
        if let Some(slot) = spec.paths.paths.get_mut(&op.path) {
            *slot = ReferenceOr::Item(single);
        }

        Ok(serde_json::to_string(&spec)?)
    }

    /// Copy of this document with one operation renamed and re-described.
    ///
    /// # Errors
    ///
    /// Fails if `old_id` is unknown, `new_id` is empty, or `new_id` is already used by another
    /// operation.
    pub fn with_renamed_operation(
        &self,
        old_id: &str,
        new_id: &str,
        description: &str,
    ) -> Result<Self> {
        let current = self
            .find_operation(old_id)
            .ok_or_else(|| OpenApiToolsError::OperationNotFound(old_id.to_string()))?;

        let new_id = new_id.trim();
        if new_id.is_empty() {
            return Err(OpenApiToolsError::MissingOperationId {
                method: current.method.to_string(),
                path: current.path.clone(),
            });
        }
        if new_id != old_id && self.find_operation(new_id).is_some() {
            return Err(OpenApiToolsError::DuplicateOperationId(new_id.to_string()));
        }

        let mut renamed_op = (**current).clone();
        renamed_op.operation_id = new_id.to_string();
        renamed_op.description = Some(description.to_string());

        let mut item = self
            .path_items
            .get(&current.path)
            .cloned()
            .ok_or_else(|| OpenApiToolsError::OperationNotFound(old_id.to_string()))?;
        if let Some(operation) = operation_slot_mut(&mut item, &current.method) {
            operation.operation_id = Some(new_id.to_string());
            operation.description = Some(description.to_string());
        }

        let mut out = self.clone();
        if let Some(slot) = out.spec.paths.paths.get_mut(&current.path) {
            *slot = ReferenceOr::Item(item.clone());
        }
        out.path_items.insert(current.path.clone(), item);
        for op in &mut out.operations {
            if op.operation_id == old_id {
                *op = Arc::new(renamed_op.clone());
            }
        }
        Ok(out)
    }
}

fn validate_servers(spec: &OpenAPI) -> Result<Vec<String>> {
    if spec.servers.is_empty() {
        return Err(OpenApiToolsError::NoServers);
    }
    spec.servers
        .iter()
        .map(|server| {
            if SERVER_URL.is_match(&server.url) {
                Ok(server.url.clone())
            } else {
                Err(OpenApiToolsError::InvalidServerUrl(server.url.clone()))
            }
        })
        .collect()
}

fn operations_of(item: &PathItem) -> impl Iterator<Item = (Method, &Operation)> {
    [
        (Method::GET, &item.get),
        (Method::PUT, &item.put),
        (Method::POST, &item.post),
        (Method::DELETE, &item.delete),
        (Method::OPTIONS, &item.options),
        (Method::HEAD, &item.head),
        (Method::PATCH, &item.patch),
        (Method::TRACE, &item.trace),
    ]
    .into_iter()
    .filter_map(|(method, op)| op.as_ref().map(|op| (method, op)))
}

fn operation_slot<'a>(item: &'a PathItem, method: &Method) -> &'a Option<Operation> {
    match *method {
        Method::PUT => &item.put,
        Method::POST => &item.post,
        Method::DELETE => &item.delete,
        Method::OPTIONS => &item.options,
        Method::HEAD => &item.head,
        Method::PATCH => &item.patch,
        Method::TRACE => &item.trace,
        _ => &item.get,
    }
}

fn operation_slot_mut<'a>(item: &'a mut PathItem, method: &Method) -> &'a mut Option<Operation> {
    match *method {
        Method::PUT => &mut item.put,
        Method::POST => &mut item.post,
        Method::DELETE => &mut item.delete,
        Method::OPTIONS => &mut item.options,
        Method::HEAD => &mut item.head,
        Method::PATCH => &mut item.patch,
        Method::TRACE => &mut item.trace,
        _ => &mut item.get,
    }
}

struct OperationSource<'a> {
    path: &'a str,
    method: Method,
    operation_id: &'a str,
    path_item_params: &'a [ReferenceOr<Parameter>],
    operation: &'a Operation,
}

async fn build_operation(
    resolver: &OpenApiResolver<'_>,
    current_doc: &DocId,
    source: OperationSource<'_>,
) -> Result<OperationSpec> {
    let merged = merge_parameters(
        resolver,
        current_doc,
        source.path_item_params,
        &source.operation.parameters,
    )
    .await?;

    let mut parameters = Vec::with_capacity(merged.len());
    for (param_doc, param) in &merged {
        let data = param.parameter_data_ref();
        let mut schema = parameter_schema(resolver, param_doc, &data.format).await?;
        if let (Some(obj), Some(desc)) = (schema.as_object_mut(), data.description.as_ref())
            && !obj.contains_key("description")
        {
            obj.insert("description".to_string(), Value::String(desc.clone()));
        }
        let location = ParamLocation::of(param);
        parameters.push(ParameterSpec {
            name: data.name.clone(),
            location,
            required: data.required || location == ParamLocation::Path,
            schema,
        });
    }

    let body_schema = match &source.operation.request_body {
        Some(body_ref) => {
            let Resolved {
                doc: body_doc,
                value: body,
                ..
            } = resolver.resolve(current_doc, body_ref).await?;
            match body
                .content
                .get(JSON_MEDIA_TYPE)
                .and_then(|media| media.schema.as_ref())
            {
                Some(schema) => Some(schema_ref_to_json(resolver, &body_doc, schema).await?),
                None if body.content.contains_key(JSON_MEDIA_TYPE) => {
                    Some(Value::Object(JsonObject::new()))
                }
                None => None,
            }
        }
        None => None,
    };

    let input_schema = build_input_schema(&parameters, body_schema.as_ref());

    Ok(OperationSpec {
        operation_id: source.operation_id.to_string(),
        method: source.method,
        path: source.path.to_string(),
        summary: source.operation.summary.clone(),
        description: source.operation.description.clone(),
        parameters,
        body_schema,
        input_schema: Arc::new(input_schema),
    })
}

async fn merge_parameters(
    resolver: &OpenApiResolver<'_>,
    current_doc: &DocId,
    path_item_params: &[ReferenceOr<Parameter>],
    operation_params: &[ReferenceOr<Parameter>],
) -> Result<Vec<(DocId, Parameter)>> {
    let mut merged: Vec<(DocId, Parameter)> = Vec::new();
    let mut index: HashMap<(ParamLocation, String), usize> = HashMap::new();

    for p in path_item_params.iter().chain(operation_params) {
        let Resolved { doc, value: rp, .. } = resolver.resolve(current_doc, p).await?;
        let key = (ParamLocation::of(&rp), rp.parameter_data_ref().name.clone());
        if let Some(i) = index.get(&key).copied() {
            merged[i] = (doc, rp);
        } else {
            index.insert(key, merged.len());
            merged.push((doc, rp));
        }
    }

    Ok(merged)
}
