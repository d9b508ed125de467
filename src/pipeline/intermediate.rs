//! The intermediate form: a transferable unit of partial index construction.

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::analysis::Analyzer;
use crate::document::DocOperation;
use crate::error::Result;
use crate::pipeline::codec;
use crate::segment::{DeletionPolicy, SegmentWriter, SegmentWriterConfig};
use crate::storage::ram::RamDirectory;

/// Configuration applied to a form's embedded segment writer.
#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateFormConfig {
    /// Maximum number of tokens indexed per text field. Zero or negative
    /// means unlimited.
    pub max_field_length: i64,

    /// Bundle each flushed sub-segment into a single container file.
    pub use_compound: bool,

    /// Commit retention policy recorded in segment metadata.
    pub deletion_policy: DeletionPolicy,
}

impl Default for IntermediateFormConfig {
    fn default() -> Self {
        IntermediateFormConfig {
            max_field_length: -1,
            use_compound: true,
            deletion_policy: DeletionPolicy::default(),
        }
    }
}

impl IntermediateFormConfig {
    fn writer_config(&self) -> SegmentWriterConfig {
        let max_field_length = if self.max_field_length > 0 {
            Some(u32::try_from(self.max_field_length).unwrap_or(u32::MAX))
        } else {
            None
        };

        SegmentWriterConfig {
            max_field_length,
            use_compound: self.use_compound,
            deletion_policy: self.deletion_policy,
        }
    }
}

/// A mergeable, serializable unit of partial index construction.
///
/// A form accumulates document operations into an embedded in-memory
/// segment set. Forms built on different workers merge by absorbing each
/// other's sub-segments, and a form round-trips through any byte stream
/// for shuffling between pipeline stages.
pub struct IntermediateForm {
    dir: Arc<RamDirectory>,
    writer: SegmentWriter,
    num_ops: u64,
    config: IntermediateFormConfig,
}

impl IntermediateForm {
    /// Create an empty form with default configuration.
    pub fn new() -> Self {
        Self::with_config(IntermediateFormConfig::default())
    }

    /// Create an empty form with the given configuration.
    pub fn with_config(config: IntermediateFormConfig) -> Self {
        IntermediateForm {
            dir: Arc::new(RamDirectory::new()),
            writer: SegmentWriter::new(),
            num_ops: 0,
            config,
        }
    }

    /// Replace the form's configuration.
    ///
    /// Takes effect the next time the embedded writer opens; a writer that
    /// is already open keeps the configuration it opened with.
    pub fn configure(&mut self, config: IntermediateFormConfig) {
        self.config = config;
    }

    /// Apply a document operation to this form.
    pub fn process(&mut self, operation: &DocOperation, analyzer: &dyn Analyzer) -> Result<()> {
        self.ensure_writer()?;
        match operation {
            DocOperation::Add(document) => self.writer.add_document(document, analyzer)?,
            DocOperation::Delete(term) => self.writer.delete_term(term.clone())?,
        }
        self.num_ops += 1;
        Ok(())
    }

    /// Merge another form's accumulated state into this one.
    ///
    /// Merging an empty form is a no-op that leaves this form untouched.
    /// Any locally buffered operations are flushed first so the absorbed
    /// sub-segments land after them.
    pub fn process_form(&mut self, other: &IntermediateForm) -> Result<()> {
        if other.dir.total_size() == 0 {
            return Ok(());
        }

        self.ensure_writer()?;
        self.writer.absorb(&other.dir)?;
        // Counts merge events, not merged documents
        self.num_ops += 1;
        Ok(())
    }

    /// Flush buffered operations and close the embedded writer.
    ///
    /// Idempotent, and a no-op on a form whose writer never opened. The
    /// form stays usable: the next operation opens a fresh writer that
    /// appends after the existing sub-segments.
    pub fn close_writer(&mut self) -> Result<()> {
        self.writer.close()
    }

    /// Total footprint: bytes held by flushed files plus an estimate of
    /// memory held by buffered, not yet flushed operations.
    ///
    /// Zero exactly when the form holds no accumulated state.
    pub fn total_size_in_bytes(&self) -> u64 {
        self.dir.total_size() + self.writer.ram_bytes_used()
    }

    /// Number of operations applied to this form. Each processed document
    /// operation counts once, and each non-empty merged form counts once.
    pub fn num_ops(&self) -> u64 {
        self.num_ops
    }

    /// The directory holding this form's flushed segment files.
    pub fn directory(&self) -> &RamDirectory {
        &self.dir
    }

    /// Serialize the form's flushed state into a byte stream.
    ///
    /// Call [`close_writer`](Self::close_writer) first; buffered operations
    /// that were never flushed are not part of the stream.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        codec::write_directory(writer, &self.dir)
    }

    /// Replace this form's state with one deserialized from a byte stream.
    ///
    /// Existing content is discarded before loading, so a form instance
    /// can be reused across many incoming streams.
    pub fn deserialize<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        // Drop the writer before the store so no buffered state can leak
        // into the freshly loaded content.
        self.writer = SegmentWriter::new();
        self.dir.reset();
        self.num_ops = 0;

        codec::read_directory(reader, &self.dir)
    }

    /// Open the embedded writer, replacing one that was closed.
    fn ensure_writer(&mut self) -> Result<()> {
        if self.writer.is_closed() {
            self.writer = SegmentWriter::new();
        }
        self.writer
            .ensure_open(Arc::clone(&self.dir), self.config.writer_config())
    }
}

impl Default for IntermediateForm {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IntermediateForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntermediateForm[num_ops={}]", self.num_ops)
    }
}

impl fmt::Debug for IntermediateForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntermediateForm")
            .field("num_ops", &self.num_ops)
            .field("files", &self.dir.file_count())
            .field("total_size", &self.total_size_in_bytes())
            .finish()
    }
}
