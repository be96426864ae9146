//! `$ref` resolution for tool documents.
//!
//! Documents reach the bridge as strings, so the root is always [`DocId::Inline`]. A `$ref` can
//! still leave it: `#/components/...` stays in the same document, a path names a YAML/JSON file
//! (relative to the file holding the ref, or to the working directory when the ref sits in the
//! inline root), and an `http(s)` location is fetched with the dispatcher's client. Every
//! document loaded this way is cached for the lifetime of one resolver.

use crate::error::{OpenApiToolsError, Result};
use openapiv3::{OpenAPI, ReferenceOr, Schema};
use parking_lot::RwLock;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocId {
    /// The submitted tool document.
    Inline,
    File(PathBuf),
    Url(Url),
}

impl DocId {
    fn file(path: PathBuf) -> Self {
        DocId::File(std::fs::canonicalize(&path).unwrap_or(path))
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocId::Inline => f.write_str("<inline>"),
            DocId::File(path) => write!(f, "{}", path.display()),
            DocId::Url(url) => write!(f, "{url}"),
        }
    }
}

/// The place a `$ref` points at: a document and an optional JSON pointer into it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefTarget {
    pub doc: DocId,
    pub pointer: Option<String>,
}

impl RefTarget {
    fn locate(base: &DocId, reference: &str) -> Result<Self> {
        let (location, fragment) = reference.split_once('#').unwrap_or((reference, ""));
        let pointer = match fragment {
            "" => None,
            ptr if ptr.starts_with('/') => Some(ptr.to_string()),
            _ => {
                return Err(bad_ref(format!(
                    "'{reference}' has a fragment that is not a JSON pointer"
                )));
            }
        };
        Ok(Self {
            doc: locate_doc(base, location)?,
            pointer,
        })
    }
}

impl fmt::Display for RefTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pointer {
            Some(ptr) => write!(f, "{}#{ptr}", self.doc),
            None => write!(f, "{}", self.doc),
        }
    }
}

/// A value with `$ref`s followed: where it lives, and every target passed through on the way.
#[derive(Debug)]
pub struct Resolved<T> {
    pub doc: DocId,
    pub value: T,
    pub via: Vec<RefTarget>,
}

fn bad_ref(message: String) -> OpenApiToolsError {
    OpenApiToolsError::Resolve(message)
}

fn without_fragment(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

fn locate_doc(base: &DocId, location: &str) -> Result<DocId> {
    if location.is_empty() {
        return Ok(base.clone());
    }
    if location.starts_with("http://") || location.starts_with("https://") {
        let url = Url::parse(location).map_err(|e| bad_ref(format!("bad URL '{location}': {e}")))?;
        return Ok(DocId::Url(without_fragment(url)));
    }
    if location.starts_with("file://") {
        let path = Url::parse(location)
            .ok()
            .and_then(|url| url.to_file_path().ok())
            .ok_or_else(|| bad_ref(format!("file URL has no local path: {location}")))?;
        return Ok(DocId::file(path));
    }
    match base {
        DocId::Url(url) => url
            .join(location)
            .map(|joined| DocId::Url(without_fragment(joined)))
            .map_err(|e| bad_ref(format!("cannot join '{location}' onto {url}: {e}"))),
        // `join` keeps absolute paths as they are.
        DocId::File(path) => Ok(DocId::file(
            path.parent().unwrap_or_else(|| Path::new(".")).join(location),
        )),
        DocId::Inline => Ok(DocId::file(PathBuf::from(location))),
    }
}

#[derive(Debug)]
pub struct OpenApiResolver<'a> {
    client: &'a Client,
    docs: RwLock<HashMap<DocId, Arc<Value>>>,
}

impl<'a> OpenApiResolver<'a> {
    /// # Errors
    ///
    /// Returns an error if the document cannot be turned into JSON for lookups.
    pub fn new(spec: &OpenAPI, client: &'a Client) -> Result<Self> {
        let root = Arc::new(serde_json::to_value(spec)?);
        Ok(Self {
            client,
            docs: RwLock::new(HashMap::from([(DocId::Inline, root)])),
        })
    }

    /// Follow `r` until it is an item. A `$ref` chain that comes back to itself is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if a target cannot be loaded, is missing, has the wrong shape, or the
    /// chain is cyclic.
    pub async fn resolve<T>(&self, base: &DocId, r: &ReferenceOr<T>) -> Result<Resolved<T>>
    where
        T: Clone + DeserializeOwned,
    {
        let mut doc = base.clone();
        let mut via: Vec<RefTarget> = Vec::new();
        let mut current = r.clone();

        loop {
            let reference = match current {
                ReferenceOr::Item(value) => return Ok(Resolved { doc, value, via }),
                ReferenceOr::Reference { reference } => reference,
            };
            let target = RefTarget::locate(&doc, &reference)?;
            if via.contains(&target) {
                return Err(bad_ref(format!("$ref cycle through {target}")));
            }

            let value = self.lookup(&target).await?;
            current = serde_json::from_value(value)
                .map_err(|e| bad_ref(format!("{target} has an unexpected shape: {e}")))?;
            doc = target.doc.clone();
            via.push(target);
        }
    }

    /// [`Self::resolve`] for the boxed schemas found under `items` and `properties`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::resolve`].
    pub async fn resolve_boxed(
        &self,
        base: &DocId,
        schema: &ReferenceOr<Box<Schema>>,
    ) -> Result<Resolved<Schema>> {
        match schema {
            ReferenceOr::Item(schema) => Ok(Resolved {
                doc: base.clone(),
                value: (**schema).clone(),
                via: Vec::new(),
            }),
            ReferenceOr::Reference { reference } => {
                let unboxed = ReferenceOr::<Schema>::Reference {
                    reference: reference.clone(),
                };
                self.resolve(base, &unboxed).await
            }
        }
    }

    async fn lookup(&self, target: &RefTarget) -> Result<Value> {
        let doc = self.document(&target.doc).await?;
        match &target.pointer {
            None => Ok((*doc).clone()),
            Some(ptr) => doc
                .pointer(ptr)
                .cloned()
                .ok_or_else(|| bad_ref(format!("unresolved $ref {target}"))),
        }
    }

    async fn document(&self, id: &DocId) -> Result<Arc<Value>> {
        if let Some(doc) = self.docs.read().get(id) {
            return Ok(Arc::clone(doc));
        }

        let raw = match id {
            DocId::Inline => return Err(bad_ref("inline document is not loaded".to_string())),
            DocId::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| bad_ref(format!("cannot read {}: {e}", path.display())))?,
            DocId::Url(url) => self.fetch(url).await?,
        };
        // JSON is a subset of YAML.
        let parsed: Value =
            serde_yaml::from_str(&raw).map_err(|e| bad_ref(format!("cannot parse {id}: {e}")))?;

        let parsed = Arc::new(parsed);
        self.docs.write().insert(id.clone(), Arc::clone(&parsed));
        Ok(parsed)
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        let failed = |e: reqwest::Error| {
            bad_ref(format!(
                "cannot fetch {}: {}",
                mcp_bridge_http_tools::safety::redact_url(url),
                mcp_bridge_http_tools::safety::sanitize_reqwest_error(&e)
            ))
        };
        self.client
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(failed)?
            .text()
            .await
            .map_err(failed)
    }
}
