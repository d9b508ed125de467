//! Document operations applied to an intermediate form.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::document::Document;

/// A field/text pair identifying documents to delete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term {
    /// The field the term belongs to.
    pub field: String,

    /// The term text.
    pub text: String,
}

impl Term {
    /// Create a new term.
    pub fn new<F: Into<String>, T: Into<String>>(field: F, text: T) -> Self {
        Term {
            field: field.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}

/// A single unit of work applied to an intermediate form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DocOperation {
    /// Insert a document into the embedded index.
    Add(Document),

    /// Record a deletion of all documents matching the term.
    Delete(Term),
}

impl DocOperation {
    /// Create an add operation.
    pub fn add(document: Document) -> Self {
        DocOperation::Add(document)
    }

    /// Create a delete operation.
    pub fn delete(term: Term) -> Self {
        DocOperation::Delete(term)
    }
}
