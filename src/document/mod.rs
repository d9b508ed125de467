//! Documents, field values, and the document operations fed to a form.

pub mod document;
pub mod field_value;
pub mod operation;

pub use document::{Document, DocumentBuilder};
pub use field_value::FieldValue;
pub use operation::{DocOperation, Term};
