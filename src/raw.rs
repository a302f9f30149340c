//! Wire-form values exchanged with the transport boundary.
//!
//! A remote call or feed fetch hands the core untyped data: `null`, a string,
//! a record of named values, or an array of either. `RawValue` is that shape.
//! Numbers and booleans arriving as JSON are carried as their string forms;
//! the wire is stringly typed and the typed accessors on `Entity` do the
//! parsing on first read.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single wire-form value as received from (or sent to) a transport layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Text(String),
    Array(Vec<RawValue>),
    Record(IndexMap<String, RawValue>),
}

impl RawValue {
    /// Build a `RawValue` from a `serde_json::Value`.
    ///
    /// Scalars other than strings are converted to their string forms.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawValue::Null,
            serde_json::Value::String(s) => RawValue::Text(s),
            serde_json::Value::Bool(b) => RawValue::Text(b.to_string()),
            serde_json::Value::Number(n) => RawValue::Text(n.to_string()),
            serde_json::Value::Array(items) => {
                RawValue::Array(items.into_iter().map(RawValue::from_json).collect())
            }
            serde_json::Value::Object(map) => RawValue::Record(
                map.into_iter()
                    .map(|(k, v)| (k, RawValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back to a `serde_json::Value`.
    ///
    /// Text stays text; the conversion never guesses which strings were
    /// originally numeric.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RawValue::Null => serde_json::Value::Null,
            RawValue::Text(s) => serde_json::Value::String(s.clone()),
            RawValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(RawValue::to_json).collect())
            }
            RawValue::Record(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Shorthand for building a record from key/value pairs.
    pub fn record<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, RawValue)>,
        K: Into<String>,
    {
        RawValue::Record(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Shorthand for a text value.
    pub fn text(value: impl Into<String>) -> Self {
        RawValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&IndexMap<String, RawValue>> {
        match self {
            RawValue::Record(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RawValue]> {
        match self {
            RawValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Short description of the value's shape, for error messages.
    pub fn shape(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Text(_) => "string",
            RawValue::Array(_) => "array",
            RawValue::Record(_) => "record",
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => write!(f, "null"),
            RawValue::Text(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}
