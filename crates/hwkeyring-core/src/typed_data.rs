//! Structured (typed) data versions and canonicalization

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Top-level fields kept when canonicalizing typed data
const TYPED_DATA_FIELDS: [&str; 4] = ["types", "primaryType", "domain", "message"];

/// Domain type entry every canonical payload carries
const DOMAIN_TYPE: &str = "EIP712Domain";

/// Typed data signing versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TypedDataVersion {
    V1,
    V3,
    #[default]
    V4,
}

impl TypedDataVersion {
    /// The only version the device signs
    pub const SUPPORTED: TypedDataVersion = TypedDataVersion::V4;

    pub fn as_str(&self) -> &'static str {
        match self {
            TypedDataVersion::V1 => "V1",
            TypedDataVersion::V3 => "V3",
            TypedDataVersion::V4 => "V4",
        }
    }

    /// Fail with `UnsupportedVersion` unless this is [`Self::SUPPORTED`]
    pub fn ensure_supported(&self) -> Result<()> {
        if *self == Self::SUPPORTED {
            Ok(())
        } else {
            Err(Error::UnsupportedVersion(self.as_str().to_string()))
        }
    }
}

impl fmt::Display for TypedDataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypedDataVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "V1" => Ok(TypedDataVersion::V1),
            "V3" => Ok(TypedDataVersion::V3),
            "V4" => Ok(TypedDataVersion::V4),
            other => Err(Error::UnsupportedVersion(other.to_string())),
        }
    }
}

/// Strip a typed-data payload down to its signable fields
///
/// Keeps `types`, `primaryType`, `domain` and `message` when present and
/// non-empty, and makes sure `types` has an `EIP712Domain` entry.
pub fn sanitize_typed_data(typed_data: &Value) -> Result<Value> {
    let object = typed_data.as_object().ok_or_else(|| {
        Error::Serialization("Typed data must be a JSON object".to_string())
    })?;

    let mut sanitized = Map::new();
    for field in TYPED_DATA_FIELDS {
        if let Some(value) = object.get(field).filter(|v| is_present(v)) {
            sanitized.insert(field.to_string(), value.clone());
        }
    }

    if let Some(types) = sanitized.get_mut("types") {
        let types = types.as_object_mut().ok_or_else(|| {
            Error::Serialization("Typed data `types` must be an object".to_string())
        })?;
        types
            .entry(DOMAIN_TYPE)
            .or_insert_with(|| Value::Array(Vec::new()));
    }

    Ok(Value::Object(sanitized))
}

/// Sanitized payload as a JSON string with object keys in sorted order
pub fn canonical_typed_data_json(typed_data: &Value) -> Result<String> {
    let sanitized = sanitize_typed_data(typed_data)?;
    Ok(serde_json::to_string(&sort_keys(sanitized))?)
}

// absent, null, false, zero and "" are dropped, like a JS truthiness check
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
