//! `OpenAPI` schema -> JSON Schema conversion for tool input schemas.

use crate::document::{ParameterSpec, REQUEST_BODY_ARG};
use crate::error::Result;
use crate::resolver::{DocId, OpenApiResolver, RefTarget, Resolved};
use futures::FutureExt as _;
use futures::future::BoxFuture;
use openapiv3::{
    ParameterSchemaOrContent, ReferenceOr, Schema, SchemaKind, Type, VariantOrUnknownOrEmpty,
};
use rmcp::model::JsonObject;
use serde::Serialize;
use serde_json::{Value, json};

/// Nesting bound for expanded object properties and array items.
const MAX_SCHEMA_DEPTH: usize = 16;

/// Upper bound on schema nodes expanded for one parameter or body. Shared definitions referenced
/// from many places are expanded at each use, so the output can otherwise grow exponentially.
const MAX_SCHEMA_NODES: usize = 2048;

/// Build the tool input schema: one property per parameter, plus `requestBody` when the
/// operation takes a JSON body. `required` keeps declaration order, body last.
#[must_use]
pub fn build_input_schema(parameters: &[ParameterSpec], body: Option<&Value>) -> JsonObject {
    let mut properties = JsonObject::new();
    let mut required: Vec<String> = Vec::new();

    for param in parameters {
        properties.insert(param.name.clone(), param.schema.clone());
        if param.required {
            required.push(param.name.clone());
        }
    }

    if let Some(body) = body {
        properties.insert(REQUEST_BODY_ARG.to_string(), body.clone());
        required.push(REQUEST_BODY_ARG.to_string());
    }

    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), json!(required));
    }
    schema
}

pub(crate) async fn parameter_schema(
    resolver: &OpenApiResolver<'_>,
    current_doc: &DocId,
    format: &ParameterSchemaOrContent,
) -> Result<Value> {
    match format {
        ParameterSchemaOrContent::Schema(schema) => {
            schema_ref_to_json(resolver, current_doc, schema).await
        }
        ParameterSchemaOrContent::Content(content) => {
            match content.values().find_map(|media| media.schema.as_ref()) {
                Some(schema) => schema_ref_to_json(resolver, current_doc, schema).await,
                None => Ok(json!({"type": "string"})),
            }
        }
    }
}

pub(crate) async fn schema_ref_to_json(
    resolver: &OpenApiResolver<'_>,
    current_doc: &DocId,
    schema: &ReferenceOr<Schema>,
) -> Result<Value> {
    let root = resolver.resolve(current_doc, schema).await?;
    let mut walk = Walk::default();
    walk.expand(resolver, root, 0).await
}

/// State of one schema expansion.
#[derive(Debug, Default)]
struct Walk {
    /// `$ref` targets entered on the branch being expanded.
    branch: Vec<RefTarget>,
    expanded: usize,
}

impl Walk {
    /// Expand a resolved child. A `$ref` back into its own branch becomes a shallow schema of
    /// the target's type; the recursion stops there.
    async fn expand(
        &mut self,
        resolver: &OpenApiResolver<'_>,
        resolved: Resolved<Schema>,
        depth: usize,
    ) -> Result<Value> {
        if resolved.via.iter().any(|target| self.branch.contains(target)) {
            return Ok(shallow(&resolved.value));
        }
        let entered = self.branch.len();
        self.branch.extend(resolved.via);
        let out = schema_to_json(resolver, &resolved.doc, &resolved.value, self, depth).await;
        self.branch.truncate(entered);
        out
    }
}

fn schema_to_json<'a>(
    resolver: &'a OpenApiResolver<'_>,
    current_doc: &'a DocId,
    schema: &'a Schema,
    walk: &'a mut Walk,
    depth: usize,
) -> BoxFuture<'a, Result<Value>> {
    async move {
        let mut out = JsonObject::new();
        if let Some(desc) = &schema.schema_data.description {
            out.insert("description".to_string(), json!(desc));
        }
        walk.expanded += 1;
        if depth >= MAX_SCHEMA_DEPTH || walk.expanded > MAX_SCHEMA_NODES {
            return Ok(Value::Object(out));
        }

        match &schema.schema_kind {
            SchemaKind::Type(Type::String(s)) => {
                out.insert("type".to_string(), json!("string"));
                insert_format(&mut out, &s.format);
                let values: Vec<&String> = s.enumeration.iter().flatten().collect();
                if !values.is_empty() {
                    out.insert("enum".to_string(), json!(values));
                }
            }
            SchemaKind::Type(Type::Number(n)) => {
                out.insert("type".to_string(), json!("number"));
                insert_format(&mut out, &n.format);
            }
            SchemaKind::Type(Type::Integer(i)) => {
                out.insert("type".to_string(), json!("integer"));
                insert_format(&mut out, &i.format);
            }
            SchemaKind::Type(Type::Boolean(_)) => {
                out.insert("type".to_string(), json!("boolean"));
            }
            SchemaKind::Type(Type::Array(a)) => {
                out.insert("type".to_string(), json!("array"));
                if let Some(items) = &a.items {
                    let item = resolver.resolve_boxed(current_doc, items).await?;
                    let item = walk.expand(resolver, item, depth + 1).await?;
                    out.insert("items".to_string(), item);
                }
            }
            SchemaKind::Type(Type::Object(o)) => {
                out.insert("type".to_string(), json!("object"));
                if !o.properties.is_empty() {
                    let mut properties = JsonObject::new();
                    for (name, prop) in &o.properties {
                        let prop = resolver.resolve_boxed(current_doc, prop).await?;
                        let prop = walk.expand(resolver, prop, depth + 1).await?;
                        properties.insert(name.clone(), prop);
                    }
                    out.insert("properties".to_string(), Value::Object(properties));
                }
                if !o.required.is_empty() {
                    out.insert("required".to_string(), json!(o.required));
                }
            }
            SchemaKind::Any(any) => {
                if let Some(typ) = &any.typ {
                    out.insert("type".to_string(), json!(typ));
                }
            }
            // allOf / oneOf / anyOf / not: left untyped.
            _ => {}
        }

        Ok(Value::Object(out))
    }
    .boxed()
}

fn shallow(schema: &Schema) -> Value {
    let typ = match &schema.schema_kind {
        SchemaKind::Type(Type::String(_)) => "string",
        SchemaKind::Type(Type::Number(_)) => "number",
        SchemaKind::Type(Type::Integer(_)) => "integer",
        SchemaKind::Type(Type::Boolean(_)) => "boolean",
        SchemaKind::Type(Type::Array(_)) => "array",
        SchemaKind::Any(any) => match any.typ.as_deref() {
            Some(typ) => return json!({ "type": typ }),
            None => return json!({}),
        },
        _ => "object",
    };
    json!({ "type": typ })
}

fn insert_format<T: Serialize>(out: &mut JsonObject, format: &VariantOrUnknownOrEmpty<T>) {
    let value = match format {
        VariantOrUnknownOrEmpty::Item(f) => serde_json::to_value(f).ok(),
        VariantOrUnknownOrEmpty::Unknown(f) => Some(Value::String(f.clone())),
        VariantOrUnknownOrEmpty::Empty => None,
    };
    if let Some(value) = value {
        out.insert("format".to_string(), value);
    }
}
