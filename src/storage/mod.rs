//! In-memory storage backing a form's segment file set.

pub mod ram;
pub mod structured;
pub mod traits;

pub use ram::{RamDirectory, RamInput};
pub use traits::{StorageError, StorageInput, StorageOutput};
