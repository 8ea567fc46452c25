//! Mutable key/value view over a parsed FHIR JSON document.
//!
//! The view keeps keys in the order they were parsed (serde_json is built with
//! `preserve_order`), so a document that is parsed, lightly mutated and written
//! back differs from the input only in the keys that were touched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DocumentError, Result};

/// Key carrying the FHIR resource type name.
pub const RESOURCE_TYPE_KEY: &str = "resourceType";

/// Key carrying the logical resource id.
pub const ID_KEY: &str = "id";

/// A JSON object parsed from a request body.
///
/// Construction only succeeds for well-formed JSON whose root is an object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse document text.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(DocumentError::Parse)?;
        Self::from_value(value)
    }

    /// Parse a raw request body.
    pub fn parse_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes).map_err(DocumentError::Parse)?;
        Self::from_value(value)
    }

    /// Wrap an already-parsed value; the root must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(DocumentError::NotAnObject(value_kind(&other))),
        }
    }

    /// Value bound to `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Insert or overwrite `key`.
    ///
    /// Overwriting keeps the key in its original position; new keys go last.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Remove `key`, keeping the relative order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Declared resource type. Non-string values count as absent.
    pub fn resource_type(&self) -> Option<&str> {
        self.get(RESOURCE_TYPE_KEY).and_then(Value::as_str)
    }

    /// Logical id, when present as a string.
    pub fn id(&self) -> Option<&str> {
        self.get(ID_KEY).and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.put(ID_KEY, id.into());
    }

    /// Serialize to compact JSON text.
    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string(&self.fields).map_err(DocumentError::Serialize)
    }

    /// Serialize to indented JSON text.
    pub fn to_pretty_text(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.fields).map_err(DocumentError::Serialize)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl std::str::FromStr for Document {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<Value> for Document {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
