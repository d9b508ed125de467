//! Document representation.

use serde::{Deserialize, Serialize};

use crate::document::field_value::FieldValue;

/// A document is an ordered collection of named field values.
///
/// Field order is preserved so that serialized documents read back with
/// their fields in the order they were added.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    fields: Vec<(String, FieldValue)>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Document { fields: Vec::new() }
    }

    /// Create a builder for fluent document construction.
    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::new()
    }

    /// Add a field to the document. Replaces an existing field with the
    /// same name, keeping its position.
    pub fn add_field<S: Into<String>>(&mut self, name: S, value: FieldValue) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    /// Get a field value by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Iterate over fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of fields in this document.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check whether the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Rough in-memory footprint of this document, used for size accounting.
    pub fn estimated_bytes(&self) -> u64 {
        self.fields
            .iter()
            .map(|(n, v)| n.len() as u64 + v.estimated_bytes())
            .sum()
    }
}

/// Builder for fluent document construction.
#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder {
    document: Document,
}

impl DocumentBuilder {
    /// Create a new document builder.
    pub fn new() -> Self {
        DocumentBuilder {
            document: Document::new(),
        }
    }

    /// Add a text field.
    pub fn add_text<S: Into<String>, T: Into<String>>(mut self, name: S, value: T) -> Self {
        self.document
            .add_field(name, FieldValue::Text(value.into()));
        self
    }

    /// Add an integer field.
    pub fn add_integer<S: Into<String>>(mut self, name: S, value: i64) -> Self {
        self.document.add_field(name, FieldValue::Integer(value));
        self
    }

    /// Add a float field.
    pub fn add_float<S: Into<String>>(mut self, name: S, value: f64) -> Self {
        self.document.add_field(name, FieldValue::Float(value));
        self
    }

    /// Add a boolean field.
    pub fn add_boolean<S: Into<String>>(mut self, name: S, value: bool) -> Self {
        self.document.add_field(name, FieldValue::Boolean(value));
        self
    }

    /// Add a binary field.
    pub fn add_binary<S: Into<String>>(mut self, name: S, value: Vec<u8>) -> Self {
        self.document.add_field(name, FieldValue::Binary(value));
        self
    }

    /// Add a field with an explicit value.
    pub fn add_field<S: Into<String>>(mut self, name: S, value: FieldValue) -> Self {
        self.document.add_field(name, value);
        self
    }

    /// Build the final document.
    pub fn build(self) -> Document {
        self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get_field() {
        let mut doc = Document::new();
        doc.add_field("title", FieldValue::Text("hello".to_string()));
        doc.add_field("year", FieldValue::Integer(2024));

        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get_field("title").unwrap().as_text(), Some("hello"));
        assert_eq!(doc.get_field("year").unwrap().as_integer(), Some(2024));
        assert!(doc.get_field("missing").is_none());
    }

    #[test]
    fn test_add_field_replaces_in_place() {
        let mut doc = Document::new();
        doc.add_field("a", FieldValue::Integer(1));
        doc.add_field("b", FieldValue::Integer(2));
        doc.add_field("a", FieldValue::Integer(3));

        let names: Vec<&str> = doc.fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(doc.get_field("a").unwrap().as_integer(), Some(3));
    }

    #[test]
    fn test_builder() {
        let doc = Document::builder()
            .add_text("title", "hello")
            .add_integer("year", 2024)
            .add_boolean("published", true)
            .build();

        assert_eq!(doc.len(), 3);
        assert_eq!(doc.get_field("title").unwrap().as_text(), Some("hello"));
        assert_eq!(
            doc.get_field("published"),
            Some(&FieldValue::Boolean(true))
        );
    }

    #[test]
    fn test_field_order_preserved() {
        let doc = Document::builder()
            .add_text("c", "1")
            .add_text("a", "2")
            .add_text("b", "3")
            .build();

        let names: Vec<&str> = doc.fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
