// Declarative input/output schemas: decode with serde, then run field rules

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_path_to_error::Segment;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

/// Checks and coerces a JSON value into a typed result.
pub trait Schema: Send + Sync + 'static {
    type Output: Send + 'static;

    /// `false` for the pass-through schema, so callers can tell "not configured"
    /// apart from "configured and accepted".
    const DECLARED: bool = true;

    fn parse(&self, value: Value) -> Result<Self::Output, SchemaError>;
}

/// Accepts any value unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unchecked;

impl Schema for Unchecked {
    type Output = Value;
    const DECLARED: bool = false;

    fn parse(&self, value: Value) -> Result<Value, SchemaError> {
        Ok(value)
    }
}

/// Schema backed by a serde type plus its [`Validate`] rules.
pub struct Typed<T>(PhantomData<fn() -> T>);

impl<T> Typed<T> {
    pub fn new() -> Self {
        Typed(PhantomData)
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Typed<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Typed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Typed<{}>", std::any::type_name::<T>())
    }
}

impl<T> Schema for Typed<T>
where
    T: DeserializeOwned + Validate + Send + 'static,
{
    type Output = T;

    fn parse(&self, value: Value) -> Result<T, SchemaError> {
        let parsed: T = serde_path_to_error::deserialize(value).map_err(|e| SchemaError::Fields(decode_tree(&e)))?;
        parsed.validate().map_err(SchemaError::Fields)?;
        Ok(parsed)
    }
}

/// Place a decode failure at the field it happened on. A missing field is
/// reported against its parent, so the field name is lifted from the message.
fn decode_tree(err: &serde_path_to_error::Error<serde_json::Error>) -> ErrorTree {
    let message = err.inner().to_string();
    let mut path: Vec<String> = err
        .path()
        .iter()
        .filter_map(|segment| match segment {
            Segment::Map { key } => Some(key.clone()),
            Segment::Seq { index } => Some(index.to_string()),
            Segment::Enum { variant } => Some(variant.clone()),
            Segment::Unknown => None,
        })
        .collect();
    if let Some(field) = missing_field(&message) {
        path.push(field.to_string());
    }

    let path: Vec<&str> = path.iter().map(String::as_str).collect();
    let mut tree = ErrorTree::new();
    tree.push(&path, message.as_str());
    tree
}

fn missing_field(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("missing field `")?;
    rest.split_once('`').map(|(field, _)| field)
}

/// Field-level rules applied after decoding.
pub trait Validate {
    fn validate(&self) -> Result<(), ErrorTree> {
        Ok(())
    }
}

impl Validate for Value {}

impl Validate for String {}

impl<T: Validate> Validate for Option<T> {
    fn validate(&self) -> Result<(), ErrorTree> {
        match self {
            Some(inner) => inner.validate(),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// Input decoded but broke the declared shape.
    #[error("{0}")]
    Fields(ErrorTree),

    /// Input could not be read at all.
    #[error("{0}")]
    Malformed(String),
}

impl SchemaError {
    /// Body of the `error` field in a 400 response: the error tree for schema
    /// failures, the raw message otherwise.
    pub fn detail(&self) -> Value {
        match self {
            SchemaError::Fields(tree) => serde_json::to_value(tree).unwrap_or(Value::Null),
            SchemaError::Malformed(message) => Value::String(message.clone()),
        }
    }
}

/// Nested error tree mirroring the shape of the rejected input.
///
/// Serializes as `{ "errors": [...], "properties": { "<field>": { ... } } }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorTree {
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, ErrorTree>,
}

impl ErrorTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            properties: BTreeMap::new(),
        }
    }

    /// Record `message` under the nested field `path`; an empty path targets the root.
    pub fn push(&mut self, path: &[&str], message: impl Into<String>) {
        let mut node = self;
        for segment in path {
            node = node.properties.entry((*segment).to_string()).or_default();
        }
        node.errors.push(message.into());
    }

    pub fn field(mut self, name: &str, message: impl Into<String>) -> Self {
        self.push(&[name], message);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.properties.values().all(ErrorTree::is_empty)
    }

    pub fn into_result(self) -> Result<(), ErrorTree> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    fn describe(&self, prefix: &str, out: &mut Vec<String>) {
        for error in &self.errors {
            if prefix.is_empty() {
                out.push(error.clone());
            } else {
                out.push(format!("{}: {}", prefix, error));
            }
        }
        for (name, child) in &self.properties {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };
            child.describe(&path, out);
        }
    }
}

impl fmt::Display for ErrorTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        self.describe("", &mut lines);
        write!(f, "{}", lines.join("; "))
    }
}

/// Loose structural email check: one `@`, non-empty local part, dotted domain,
/// no whitespace.
pub fn is_email(candidate: &str) -> bool {
    if candidate.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| !label.is_empty())
        && labels.last().map_or(false, |tld| tld.len() >= 2)
}
