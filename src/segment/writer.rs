//! Segment writer with an explicit lifecycle.
//!
//! The writer is a three-state machine: it starts `Uninitialized`, opens
//! lazily on first use, and ends `Closed`. Closing is idempotent, closing a
//! writer that never opened is a no-op, and reopening a closed writer is an
//! error. Callers that need a writer again after close construct a fresh one.

use std::io::Read;
use std::sync::Arc;

use ahash::AHashMap;

use crate::analysis::{Analyzer, TokenStream};
use crate::document::{Document, FieldValue, Term};
use crate::error::{Result, TsumugiError};
use crate::segment::{
    COMPOUND_EXTENSION, COMPOUND_MAGIC, DELETES_EXTENSION, DOCS_EXTENSION, META_EXTENSION,
    POSTINGS_EXTENSION, SegmentInfo, SegmentWriterConfig, parse_segment_file_name,
    segment_file_name,
};
use crate::storage::ram::RamDirectory;
use crate::storage::structured::StructWriter;

/// Field type tags used in the stored-documents section.
pub(crate) const TAG_TEXT: u8 = 0;
pub(crate) const TAG_INTEGER: u8 = 1;
pub(crate) const TAG_FLOAT: u8 = 2;
pub(crate) const TAG_BOOLEAN: u8 = 3;
pub(crate) const TAG_BINARY: u8 = 4;

/// A writer that appends sub-segments to a [`RamDirectory`].
pub struct SegmentWriter {
    state: WriterState,
}

enum WriterState {
    Uninitialized,
    Open(OpenState),
    Closed,
}

struct OpenState {
    dir: Arc<RamDirectory>,
    config: SegmentWriterConfig,
    next_generation: u64,
    buffered_docs: Vec<Document>,
    postings: AHashMap<String, Vec<u32>>,
    delete_terms: Vec<Term>,
}

impl SegmentWriter {
    /// Create a new writer. No resources are allocated until
    /// [`ensure_open`](Self::ensure_open) is called.
    pub fn new() -> Self {
        SegmentWriter {
            state: WriterState::Uninitialized,
        }
    }

    /// Check whether the writer is currently open.
    pub fn is_open(&self) -> bool {
        matches!(self.state, WriterState::Open(_))
    }

    /// Check whether the writer has been closed.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, WriterState::Closed)
    }

    /// Open the writer against the given directory, if it is not open yet.
    ///
    /// Picks up where a previous writer left off: the next generation is one
    /// past the highest generation already present in the directory. Opening
    /// a closed writer is an error.
    pub fn ensure_open(&mut self, dir: Arc<RamDirectory>, config: SegmentWriterConfig) -> Result<()> {
        match &self.state {
            WriterState::Open(_) => Ok(()),
            WriterState::Closed => Err(TsumugiError::invalid_operation(
                "Segment writer is closed and cannot be reopened",
            )),
            WriterState::Uninitialized => {
                let next_generation = dir
                    .list_files()
                    .iter()
                    .filter_map(|name| parse_segment_file_name(name))
                    .map(|(generation, _)| generation + 1)
                    .max()
                    .unwrap_or(0);

                self.state = WriterState::Open(OpenState {
                    dir,
                    config,
                    next_generation,
                    buffered_docs: Vec::new(),
                    postings: AHashMap::new(),
                    delete_terms: Vec::new(),
                });
                Ok(())
            }
        }
    }

    /// Buffer a document and index its fields.
    pub fn add_document(&mut self, document: &Document, analyzer: &dyn Analyzer) -> Result<()> {
        self.open_state()?.add_document(document, analyzer)
    }

    /// Buffer a delete term.
    pub fn delete_term(&mut self, term: Term) -> Result<()> {
        let state = self.open_state()?;
        state.delete_terms.push(term);
        Ok(())
    }

    /// Flush any buffered operations, then absorb every segment file of a
    /// foreign directory as new local sub-segments.
    ///
    /// Foreign generations are remapped past the local high-water mark, so
    /// absorbed sub-segments sort after everything already present.
    pub fn absorb(&mut self, foreign: &RamDirectory) -> Result<()> {
        let state = self.open_state()?;
        state.flush_pending()?;

        let mut generation_map: AHashMap<u64, u64> = AHashMap::new();
        for name in foreign.list_files() {
            let (foreign_generation, extension) =
                parse_segment_file_name(&name).ok_or_else(|| {
                    TsumugiError::merge(format!("Unrecognized segment file: {name}"))
                })?;

            let local_generation = *generation_map
                .entry(foreign_generation)
                .or_insert_with(|| {
                    let generation = state.next_generation;
                    state.next_generation += 1;
                    generation
                });

            // The metadata JSON inside the copied bytes still names the
            // foreign generation; readers order sub-segments by file name,
            // so only the name needs remapping.
            let bytes = read_foreign_file(foreign, &name)
                .map_err(|e| TsumugiError::merge(format!("Cannot read {name}: {e}")))?;

            let mut output = state
                .dir
                .create_output(&segment_file_name(local_generation, extension))?;
            std::io::Write::write_all(&mut output, &bytes)?;
            output.close()?;
        }

        Ok(())
    }

    /// Flush buffered operations and close the writer.
    ///
    /// Closing an already closed writer is a no-op, as is closing a writer
    /// that never opened.
    pub fn close(&mut self) -> Result<()> {
        if let WriterState::Open(state) = &mut self.state {
            state.flush_pending()?;
            self.state = WriterState::Closed;
        }
        Ok(())
    }

    /// Estimate the memory held by buffered, not yet flushed operations.
    pub fn ram_bytes_used(&self) -> u64 {
        match &self.state {
            WriterState::Open(state) => state.ram_bytes_used(),
            _ => 0,
        }
    }

    /// Number of documents buffered but not yet flushed.
    pub fn pending_doc_count(&self) -> usize {
        match &self.state {
            WriterState::Open(state) => state.buffered_docs.len(),
            _ => 0,
        }
    }

    fn open_state(&mut self) -> Result<&mut OpenState> {
        match &mut self.state {
            WriterState::Open(state) => Ok(state),
            WriterState::Uninitialized => Err(TsumugiError::invalid_operation(
                "Segment writer is not open",
            )),
            WriterState::Closed => Err(TsumugiError::invalid_operation(
                "Segment writer is closed",
            )),
        }
    }
}

impl Default for SegmentWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn read_foreign_file(foreign: &RamDirectory, name: &str) -> Result<Vec<u8>> {
    let mut input = foreign.open_input(name)?;
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;
    input.close()?;
    Ok(bytes)
}

impl OpenState {
    fn add_document(&mut self, document: &Document, analyzer: &dyn Analyzer) -> Result<()> {
        let doc_id = self.buffered_docs.len() as u32;

        for (name, value) in document.fields() {
            match value {
                FieldValue::Text(text) => {
                    let tokens = analyzer.analyze(text)?;
                    let tokens: TokenStream = match self.config.max_field_length {
                        Some(limit) => Box::new(tokens.take(limit as usize)),
                        None => tokens,
                    };
                    for token in tokens {
                        self.post(name, &token.text, doc_id);
                    }
                }
                FieldValue::Integer(value) => self.post(name, &value.to_string(), doc_id),
                FieldValue::Float(value) => self.post(name, &value.to_string(), doc_id),
                FieldValue::Boolean(value) => self.post(name, &value.to_string(), doc_id),
                // Binary fields are stored but never indexed
                FieldValue::Binary(_) => {}
            }
        }

        self.buffered_docs.push(document.clone());
        Ok(())
    }

    fn post(&mut self, field: &str, term: &str, doc_id: u32) {
        let list = self
            .postings
            .entry(format!("{field}:{term}"))
            .or_default();
        if list.last() != Some(&doc_id) {
            list.push(doc_id);
        }
    }

    /// Write buffered operations as one new sub-segment. No-op when nothing
    /// is buffered.
    fn flush_pending(&mut self) -> Result<()> {
        if self.buffered_docs.is_empty() && self.postings.is_empty() && self.delete_terms.is_empty()
        {
            return Ok(());
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let info = SegmentInfo {
            segment_id: format!("seg_{generation:06}"),
            doc_count: self.buffered_docs.len() as u64,
            generation,
            has_deletions: !self.delete_terms.is_empty(),
            deletion_policy: self.config.deletion_policy,
        };

        if self.config.use_compound {
            let scratch = RamDirectory::new();
            self.write_sections(&scratch, generation, &info)?;

            let output = self
                .dir
                .create_output(&segment_file_name(generation, COMPOUND_EXTENSION))?;
            let mut writer = StructWriter::new(output);
            writer.write_u32(COMPOUND_MAGIC)?;

            let names = scratch.list_files();
            writer.write_varint(names.len() as u64)?;
            for name in names {
                let mut input = scratch.open_input(&name)?;
                let mut bytes = Vec::new();
                input.read_to_end(&mut bytes)?;
                input.close()?;

                writer.write_string(&name)?;
                writer.write_bytes(&bytes)?;
            }
            writer.close()?;
        } else {
            let dir = Arc::clone(&self.dir);
            self.write_sections(&dir, generation, &info)?;
        }

        self.buffered_docs.clear();
        self.postings.clear();
        self.delete_terms.clear();
        Ok(())
    }

    fn write_sections(
        &self,
        target: &RamDirectory,
        generation: u64,
        info: &SegmentInfo,
    ) -> Result<()> {
        self.write_docs_section(target, generation)?;
        self.write_postings_section(target, generation)?;
        self.write_deletes_section(target, generation)?;

        let mut output = target.create_output(&segment_file_name(generation, META_EXTENSION))?;
        let json = serde_json::to_vec(info)?;
        std::io::Write::write_all(&mut output, &json)?;
        output.close()?;

        Ok(())
    }

    fn write_docs_section(&self, target: &RamDirectory, generation: u64) -> Result<()> {
        let output = target.create_output(&segment_file_name(generation, DOCS_EXTENSION))?;
        let mut writer = StructWriter::new(output);

        writer.write_varint(self.buffered_docs.len() as u64)?;
        for document in &self.buffered_docs {
            writer.write_varint(document.len() as u64)?;
            for (name, value) in document.fields() {
                writer.write_string(name)?;
                match value {
                    FieldValue::Text(text) => {
                        writer.write_u8(TAG_TEXT)?;
                        writer.write_string(text)?;
                    }
                    FieldValue::Integer(value) => {
                        writer.write_u8(TAG_INTEGER)?;
                        writer.write_u64(*value as u64)?;
                    }
                    FieldValue::Float(value) => {
                        writer.write_u8(TAG_FLOAT)?;
                        writer.write_f64(*value)?;
                    }
                    FieldValue::Boolean(value) => {
                        writer.write_u8(TAG_BOOLEAN)?;
                        writer.write_u8(u8::from(*value))?;
                    }
                    FieldValue::Binary(bytes) => {
                        writer.write_u8(TAG_BINARY)?;
                        writer.write_bytes(bytes)?;
                    }
                }
            }
        }

        writer.close()
    }

    fn write_postings_section(&self, target: &RamDirectory, generation: u64) -> Result<()> {
        let output = target.create_output(&segment_file_name(generation, POSTINGS_EXTENSION))?;
        let mut writer = StructWriter::new(output);

        let mut keys: Vec<&String> = self.postings.keys().collect();
        keys.sort();

        writer.write_varint(keys.len() as u64)?;
        for key in keys {
            writer.write_string(key)?;
            writer.write_delta_compressed_u32s(&self.postings[key])?;
        }

        writer.close()
    }

    fn write_deletes_section(&self, target: &RamDirectory, generation: u64) -> Result<()> {
        let output = target.create_output(&segment_file_name(generation, DELETES_EXTENSION))?;
        let mut writer = StructWriter::new(output);

        writer.write_varint(self.delete_terms.len() as u64)?;
        for term in &self.delete_terms {
            writer.write_string(&term.field)?;
            writer.write_string(&term.text)?;
        }

        writer.close()
    }

    fn ram_bytes_used(&self) -> u64 {
        let docs: u64 = self.buffered_docs.iter().map(|d| d.estimated_bytes()).sum();
        let postings: u64 = self
            .postings
            .iter()
            .map(|(key, list)| key.len() as u64 + 4 * list.len() as u64)
            .sum();
        let deletes: u64 = self
            .delete_terms
            .iter()
            .map(|t| (t.field.len() + t.text.len()) as u64)
            .sum();

        docs + postings + deletes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StandardAnalyzer;

    fn doc(title: &str) -> Document {
        Document::builder().add_text("title", title).build()
    }

    #[test]
    fn test_new_writer_is_uninitialized() {
        let writer = SegmentWriter::new();
        assert!(!writer.is_open());
        assert!(!writer.is_closed());
        assert_eq!(writer.ram_bytes_used(), 0);
    }

    #[test]
    fn test_close_without_open_is_noop() {
        let mut writer = SegmentWriter::new();
        writer.close().unwrap();

        // Still uninitialized, so it can open later
        assert!(!writer.is_closed());
        writer
            .ensure_open(Arc::new(RamDirectory::new()), SegmentWriterConfig::default())
            .unwrap();
        assert!(writer.is_open());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut writer = SegmentWriter::new();
        writer
            .ensure_open(Arc::new(RamDirectory::new()), SegmentWriterConfig::default())
            .unwrap();

        writer.close().unwrap();
        assert!(writer.is_closed());
        writer.close().unwrap();
        assert!(writer.is_closed());
    }

    #[test]
    fn test_reopen_after_close_fails() {
        let mut writer = SegmentWriter::new();
        writer
            .ensure_open(Arc::new(RamDirectory::new()), SegmentWriterConfig::default())
            .unwrap();
        writer.close().unwrap();

        let result = writer.ensure_open(
            Arc::new(RamDirectory::new()),
            SegmentWriterConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_operations_require_open_writer() {
        let analyzer = StandardAnalyzer::new().unwrap();
        let mut writer = SegmentWriter::new();

        assert!(writer.add_document(&doc("hello"), &analyzer).is_err());
        assert!(writer.delete_term(Term::new("id", "1")).is_err());
    }

    #[test]
    fn test_flush_compound_writes_single_file() {
        let analyzer = StandardAnalyzer::new().unwrap();
        let dir = Arc::new(RamDirectory::new());

        let mut writer = SegmentWriter::new();
        writer
            .ensure_open(Arc::clone(&dir), SegmentWriterConfig::default())
            .unwrap();
        writer.add_document(&doc("hello world"), &analyzer).unwrap();
        writer.close().unwrap();

        assert_eq!(dir.list_files(), vec!["seg_000000.cmp"]);
    }

    #[test]
    fn test_flush_non_compound_writes_sections() {
        let analyzer = StandardAnalyzer::new().unwrap();
        let dir = Arc::new(RamDirectory::new());
        let config = SegmentWriterConfig {
            use_compound: false,
            ..Default::default()
        };

        let mut writer = SegmentWriter::new();
        writer.ensure_open(Arc::clone(&dir), config).unwrap();
        writer.add_document(&doc("hello world"), &analyzer).unwrap();
        writer.close().unwrap();

        assert_eq!(
            dir.list_files(),
            vec![
                "seg_000000.docs",
                "seg_000000.post",
                "seg_000000.del",
                "seg_000000.meta",
            ]
        );
    }

    #[test]
    fn test_close_without_pending_writes_nothing() {
        let dir = Arc::new(RamDirectory::new());

        let mut writer = SegmentWriter::new();
        writer
            .ensure_open(Arc::clone(&dir), SegmentWriterConfig::default())
            .unwrap();
        writer.close().unwrap();

        assert_eq!(dir.file_count(), 0);
    }

    #[test]
    fn test_ensure_open_resumes_generation() {
        let analyzer = StandardAnalyzer::new().unwrap();
        let dir = Arc::new(RamDirectory::new());

        let mut first = SegmentWriter::new();
        first
            .ensure_open(Arc::clone(&dir), SegmentWriterConfig::default())
            .unwrap();
        first.add_document(&doc("one"), &analyzer).unwrap();
        first.close().unwrap();

        let mut second = SegmentWriter::new();
        second
            .ensure_open(Arc::clone(&dir), SegmentWriterConfig::default())
            .unwrap();
        second.add_document(&doc("two"), &analyzer).unwrap();
        second.close().unwrap();

        assert_eq!(dir.list_files(), vec!["seg_000000.cmp", "seg_000001.cmp"]);
    }

    #[test]
    fn test_absorb_remaps_generations() {
        let analyzer = StandardAnalyzer::new().unwrap();

        let foreign = Arc::new(RamDirectory::new());
        let mut foreign_writer = SegmentWriter::new();
        foreign_writer
            .ensure_open(Arc::clone(&foreign), SegmentWriterConfig::default())
            .unwrap();
        foreign_writer.add_document(&doc("remote"), &analyzer).unwrap();
        foreign_writer.close().unwrap();

        let local = Arc::new(RamDirectory::new());
        let mut writer = SegmentWriter::new();
        writer
            .ensure_open(Arc::clone(&local), SegmentWriterConfig::default())
            .unwrap();
        writer.add_document(&doc("local"), &analyzer).unwrap();
        writer.absorb(&foreign).unwrap();
        writer.close().unwrap();

        // Local flush takes generation 0, absorbed foreign segment moves to 1
        assert_eq!(local.list_files(), vec!["seg_000000.cmp", "seg_000001.cmp"]);
        assert_eq!(
            foreign.file_size("seg_000000.cmp").unwrap(),
            local.file_size("seg_000001.cmp").unwrap()
        );
    }

    #[test]
    fn test_absorb_rejects_unrecognized_files() {
        let foreign = RamDirectory::new();
        let mut output = foreign.create_output("stray.bin").unwrap();
        std::io::Write::write_all(&mut output, b"junk").unwrap();
        output.close().unwrap();

        let mut writer = SegmentWriter::new();
        writer
            .ensure_open(Arc::new(RamDirectory::new()), SegmentWriterConfig::default())
            .unwrap();

        let error = writer.absorb(&foreign).unwrap_err();
        assert!(matches!(error, TsumugiError::Merge(_)));
    }

    #[test]
    fn test_max_field_length_caps_tokens() {
        let analyzer = StandardAnalyzer::without_stop_words().unwrap();
        let dir = Arc::new(RamDirectory::new());
        let config = SegmentWriterConfig {
            max_field_length: Some(2),
            ..Default::default()
        };

        let mut writer = SegmentWriter::new();
        writer.ensure_open(Arc::clone(&dir), config).unwrap();
        writer
            .add_document(&doc("alpha beta gamma delta"), &analyzer)
            .unwrap();

        let WriterState::Open(state) = &writer.state else {
            panic!("writer must be open");
        };
        assert!(state.postings.contains_key("title:alpha"));
        assert!(state.postings.contains_key("title:beta"));
        assert!(!state.postings.contains_key("title:gamma"));
    }

    #[test]
    fn test_ram_bytes_tracks_buffered_state() {
        let analyzer = StandardAnalyzer::new().unwrap();
        let dir = Arc::new(RamDirectory::new());

        let mut writer = SegmentWriter::new();
        writer
            .ensure_open(Arc::clone(&dir), SegmentWriterConfig::default())
            .unwrap();
        assert_eq!(writer.ram_bytes_used(), 0);

        writer.add_document(&doc("hello world"), &analyzer).unwrap();
        assert!(writer.ram_bytes_used() > 0);
        assert_eq!(writer.pending_doc_count(), 1);

        writer.close().unwrap();
        assert_eq!(writer.ram_bytes_used(), 0);
    }
}
