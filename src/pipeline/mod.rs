//! The shuffle-ready unit of partial index construction.
//!
//! An [`IntermediateForm`] accumulates document operations into an embedded
//! in-memory segment set, merges with peer forms, and round-trips through a
//! byte stream so a combine/reduce stage can reassemble it elsewhere.

pub mod codec;
pub mod intermediate;

pub use intermediate::{IntermediateForm, IntermediateFormConfig};
