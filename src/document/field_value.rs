//! Field value types for documents.

use serde::{Deserialize, Serialize};

/// A typed value stored in a document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Text value, analyzed before indexing.
    Text(String),

    /// Integer value.
    Integer(i64),

    /// Floating point value.
    Float(f64),

    /// Boolean value.
    Boolean(bool),

    /// Raw binary value, stored but never indexed.
    Binary(Vec<u8>),
}

impl FieldValue {
    /// Get the text content if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Get the integer content if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Get the name of this value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Binary(_) => "binary",
        }
    }

    /// Rough in-memory footprint of this value, used for size accounting.
    pub fn estimated_bytes(&self) -> u64 {
        match self {
            FieldValue::Text(text) => text.len() as u64,
            FieldValue::Integer(_) => 8,
            FieldValue::Float(_) => 8,
            FieldValue::Boolean(_) => 1,
            FieldValue::Binary(bytes) => bytes.len() as u64,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}
