//! `OpenAPI` operations as MCP tools.
//!
//! [`document::OpenApiDocument`] parses and validates a description, [`executor::Dispatcher`]
//! turns one of its operations into a [`executor::Callable`].

pub mod document;
pub mod error;
pub mod executor;
pub mod resolver;
pub mod schema;
pub mod selector;

pub use document::{CallBinding, OpenApiDocument, OperationSpec, ParamLocation, ParameterSpec};
pub use error::{OpenApiToolsError, Result};
pub use executor::{Callable, Dispatcher};
pub use selector::{BaseUrlSelector, BaseUrlStrategy, RoundRobin, UniformRandom};
