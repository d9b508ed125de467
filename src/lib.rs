//! # Tsumugi
//!
//! Building blocks for a distributed, batch-oriented index-building pipeline.
//!
//! The central type is [`pipeline::intermediate::IntermediateForm`]: a
//! transferable, mergeable, serializable unit of partial index construction.
//! A map task feeds document operations into a form, a combine task merges
//! forms received from the shuffle, and a reduce task deserializes and merges
//! the forms for its partition before flushing the result to the durable
//! index store.
//!
//! ## Features
//!
//! - In-memory named-byte-block store backing each form's segment file set
//! - Incremental segment writing with cheap sub-segment appends for merges
//! - Deterministic, lossless wire format for the shuffle boundary
//! - Pluggable text analysis pipeline

pub mod analysis;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod segment;
pub mod storage;
pub mod util;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
