//! Typed metadata values
//!
//! Session metadata is an open string-keyed map, but the values are a small
//! closed sum type rather than raw JSON strings. Serialization to JSON happens
//! only at the store adapter boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Open metadata map attached to a session
pub type Metadata = BTreeMap<String, MetaValue>;

/// Closed value type for pipeline-specific annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Map(BTreeMap<String, MetaValue>),
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}
