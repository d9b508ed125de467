//! Segment reader that decodes the sub-segments of a directory.
//!
//! Sub-segments are ordered by the generation in their file names, not by
//! the generation recorded in their metadata. Absorbed segments keep their
//! original metadata but are renamed on arrival, and the file name is the
//! authority on ordering.

use std::collections::BTreeMap;
use std::io::Read;

use ahash::AHashMap;

use crate::document::{Document, FieldValue, Term};
use crate::error::{Result, TsumugiError};
use crate::segment::writer::{TAG_BINARY, TAG_BOOLEAN, TAG_FLOAT, TAG_INTEGER, TAG_TEXT};
use crate::segment::{
    COMPOUND_EXTENSION, COMPOUND_MAGIC, DELETES_EXTENSION, DOCS_EXTENSION, META_EXTENSION,
    POSTINGS_EXTENSION, SegmentInfo, parse_segment_file_name,
};
use crate::storage::ram::{RamDirectory, RamInput};
use crate::storage::structured::StructReader;

/// One decoded sub-segment.
#[derive(Debug, Clone)]
pub struct SubSegment {
    /// Metadata recorded when the sub-segment was written.
    pub info: SegmentInfo,

    /// Stored documents, in the order they were added.
    pub documents: Vec<Document>,

    /// Postings keyed by `field:term`, doc ids local to this sub-segment.
    pub postings: AHashMap<String, Vec<u32>>,

    /// Delete terms recorded in this sub-segment.
    pub delete_terms: Vec<Term>,
}

/// A read-only view over all sub-segments of a directory.
#[derive(Debug)]
pub struct SegmentReader {
    sub_segments: Vec<SubSegment>,
}

impl SegmentReader {
    /// Open a reader over the given directory.
    ///
    /// Files that do not follow the segment naming scheme are skipped.
    pub fn open(dir: &RamDirectory) -> Result<Self> {
        // generation -> extension -> raw section bytes
        let mut sections: BTreeMap<u64, AHashMap<String, Vec<u8>>> = BTreeMap::new();

        for name in dir.list_files() {
            let Some((generation, extension)) = parse_segment_file_name(&name) else {
                continue;
            };

            if extension == COMPOUND_EXTENSION {
                let entry = sections.entry(generation).or_default();
                unpack_compound(dir, &name, entry)?;
            } else {
                let mut input = dir.open_input(&name)?;
                let mut bytes = Vec::new();
                input.read_to_end(&mut bytes)?;
                input.close()?;
                sections
                    .entry(generation)
                    .or_default()
                    .insert(extension.to_string(), bytes);
            }
        }

        let mut sub_segments = Vec::with_capacity(sections.len());
        for (generation, mut parts) in sections {
            sub_segments.push(decode_sub_segment(generation, &mut parts)?);
        }

        Ok(SegmentReader { sub_segments })
    }

    /// Total number of stored documents across all sub-segments.
    pub fn doc_count(&self) -> u64 {
        self.sub_segments.iter().map(|s| s.info.doc_count).sum()
    }

    /// Number of sub-segments.
    pub fn sub_segment_count(&self) -> usize {
        self.sub_segments.len()
    }

    /// The decoded sub-segments in ascending generation order.
    pub fn sub_segments(&self) -> &[SubSegment] {
        &self.sub_segments
    }

    /// Iterate over all stored documents in sub-segment order.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.sub_segments.iter().flat_map(|s| s.documents.iter())
    }

    /// Collect all delete terms across sub-segments, in order.
    pub fn delete_terms(&self) -> Vec<&Term> {
        self.sub_segments
            .iter()
            .flat_map(|s| s.delete_terms.iter())
            .collect()
    }

    /// Number of documents containing the given term, across sub-segments.
    pub fn doc_frequency(&self, field: &str, term: &str) -> usize {
        let key = format!("{field}:{term}");
        self.sub_segments
            .iter()
            .filter_map(|s| s.postings.get(&key))
            .map(|list| list.len())
            .sum()
    }
}

fn unpack_compound(
    dir: &RamDirectory,
    name: &str,
    entry: &mut AHashMap<String, Vec<u8>>,
) -> Result<()> {
    let input = dir.open_input(name)?;
    let mut reader = StructReader::new(input)?;

    let magic = reader.read_u32()?;
    if magic != COMPOUND_MAGIC {
        return Err(TsumugiError::serialization(format!(
            "Bad compound magic in {name}: {magic:#010x}"
        )));
    }

    let count = reader.read_varint()?;
    for _ in 0..count {
        let inner_name = reader.read_string()?;
        let bytes = reader.read_bytes()?;

        // Inner names may carry a stale generation after an absorb; only
        // the extension matters here.
        let Some((_, extension)) = parse_segment_file_name(&inner_name) else {
            return Err(TsumugiError::serialization(format!(
                "Unrecognized section {inner_name} in {name}"
            )));
        };
        entry.insert(extension.to_string(), bytes);
    }

    if !reader.verify_checksum()? {
        return Err(TsumugiError::serialization(format!(
            "Checksum mismatch in {name}"
        )));
    }
    reader.close()
}

fn decode_sub_segment(
    generation: u64,
    parts: &mut AHashMap<String, Vec<u8>>,
) -> Result<SubSegment> {
    let take = |parts: &mut AHashMap<String, Vec<u8>>, extension: &str| {
        parts.remove(extension).ok_or_else(|| {
            TsumugiError::serialization(format!(
                "Sub-segment {generation} is missing its {extension} section"
            ))
        })
    };

    let meta = take(parts, META_EXTENSION)?;
    let info: SegmentInfo = serde_json::from_slice(&meta)?;

    let documents = decode_docs(&take(parts, DOCS_EXTENSION)?)?;
    let postings = decode_postings(&take(parts, POSTINGS_EXTENSION)?)?;
    let delete_terms = decode_deletes(&take(parts, DELETES_EXTENSION)?)?;

    Ok(SubSegment {
        info,
        documents,
        postings,
        delete_terms,
    })
}

fn decode_docs(bytes: &[u8]) -> Result<Vec<Document>> {
    let mut reader = StructReader::new(RamInput::from_bytes(bytes.to_vec()))?;

    let doc_count = reader.read_varint()?;
    let mut documents = Vec::with_capacity(doc_count as usize);
    for _ in 0..doc_count {
        let field_count = reader.read_varint()?;
        let mut document = Document::new();
        for _ in 0..field_count {
            let name = reader.read_string()?;
            let tag = reader.read_u8()?;
            let value = match tag {
                TAG_TEXT => FieldValue::Text(reader.read_string()?),
                TAG_INTEGER => FieldValue::Integer(reader.read_u64()? as i64),
                TAG_FLOAT => FieldValue::Float(reader.read_f64()?),
                TAG_BOOLEAN => FieldValue::Boolean(reader.read_u8()? != 0),
                TAG_BINARY => FieldValue::Binary(reader.read_bytes()?),
                other => {
                    return Err(TsumugiError::serialization(format!(
                        "Unknown field type tag: {other}"
                    )));
                }
            };
            document.add_field(name, value);
        }
        documents.push(document);
    }

    verify(&mut reader, "docs")?;
    Ok(documents)
}

fn decode_postings(bytes: &[u8]) -> Result<AHashMap<String, Vec<u32>>> {
    let mut reader = StructReader::new(RamInput::from_bytes(bytes.to_vec()))?;

    let count = reader.read_varint()?;
    let mut postings = AHashMap::with_capacity(count as usize);
    for _ in 0..count {
        let key = reader.read_string()?;
        let doc_ids = reader.read_delta_compressed_u32s()?;
        postings.insert(key, doc_ids);
    }

    verify(&mut reader, "postings")?;
    Ok(postings)
}

fn decode_deletes(bytes: &[u8]) -> Result<Vec<Term>> {
    let mut reader = StructReader::new(RamInput::from_bytes(bytes.to_vec()))?;

    let count = reader.read_varint()?;
    let mut terms = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let field = reader.read_string()?;
        let text = reader.read_string()?;
        terms.push(Term::new(field, text));
    }

    verify(&mut reader, "deletes")?;
    Ok(terms)
}

fn verify(reader: &mut StructReader<RamInput>, section: &str) -> Result<()> {
    if !reader.verify_checksum()? {
        return Err(TsumugiError::serialization(format!(
            "Checksum mismatch in {section} section"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::analysis::StandardAnalyzer;
    use crate::segment::writer::SegmentWriter;
    use crate::segment::SegmentWriterConfig;

    fn build_directory(use_compound: bool) -> Arc<RamDirectory> {
        let analyzer = StandardAnalyzer::new().unwrap();
        let dir = Arc::new(RamDirectory::new());
        let config = SegmentWriterConfig {
            use_compound,
            ..Default::default()
        };

        let mut writer = SegmentWriter::new();
        writer.ensure_open(Arc::clone(&dir), config).unwrap();
        writer
            .add_document(
                &Document::builder()
                    .add_text("title", "hello world")
                    .add_integer("year", 2024)
                    .build(),
                &analyzer,
            )
            .unwrap();
        writer
            .add_document(
                &Document::builder().add_text("title", "hello again").build(),
                &analyzer,
            )
            .unwrap();
        writer.delete_term(Term::new("id", "stale")).unwrap();
        writer.close().unwrap();

        dir
    }

    #[test]
    fn test_read_compound_segment() {
        let dir = build_directory(true);
        let reader = SegmentReader::open(&dir).unwrap();

        assert_eq!(reader.sub_segment_count(), 1);
        assert_eq!(reader.doc_count(), 2);
        assert_eq!(reader.doc_frequency("title", "hello"), 2);
        assert_eq!(reader.doc_frequency("title", "world"), 1);
        assert_eq!(reader.doc_frequency("year", "2024"), 1);
        assert_eq!(reader.doc_frequency("title", "missing"), 0);

        let docs: Vec<_> = reader.documents().collect();
        assert_eq!(docs[0].get_field("title").unwrap().as_text(), Some("hello world"));
        assert_eq!(docs[1].get_field("title").unwrap().as_text(), Some("hello again"));

        let deletes = reader.delete_terms();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0], &Term::new("id", "stale"));
    }

    #[test]
    fn test_read_non_compound_segment() {
        let dir = build_directory(false);
        let reader = SegmentReader::open(&dir).unwrap();

        assert_eq!(reader.sub_segment_count(), 1);
        assert_eq!(reader.doc_count(), 2);
        assert!(reader.sub_segments()[0].info.has_deletions);
    }

    #[test]
    fn test_empty_directory() {
        let dir = RamDirectory::new();
        let reader = SegmentReader::open(&dir).unwrap();

        assert_eq!(reader.sub_segment_count(), 0);
        assert_eq!(reader.doc_count(), 0);
        assert!(reader.documents().next().is_none());
    }

    #[test]
    fn test_unknown_files_are_skipped() {
        let dir = build_directory(true);
        let mut output = dir.create_output("notes.txt").unwrap();
        std::io::Write::write_all(&mut output, b"not a segment").unwrap();
        output.close().unwrap();

        let reader = SegmentReader::open(&dir).unwrap();
        assert_eq!(reader.sub_segment_count(), 1);
    }

    #[test]
    fn test_sub_segments_ordered_by_generation() {
        let analyzer = StandardAnalyzer::new().unwrap();
        let dir = Arc::new(RamDirectory::new());

        let mut writer = SegmentWriter::new();
        writer
            .ensure_open(Arc::clone(&dir), SegmentWriterConfig::default())
            .unwrap();
        for title in ["first", "second", "third"] {
            writer
                .add_document(
                    &Document::builder().add_text("title", title).build(),
                    &analyzer,
                )
                .unwrap();
            // One sub-segment per document
            let other = Arc::new(RamDirectory::new());
            writer.absorb(&other).unwrap();
        }
        writer.close().unwrap();

        let reader = SegmentReader::open(&dir).unwrap();
        assert_eq!(reader.sub_segment_count(), 3);

        let titles: Vec<_> = reader
            .documents()
            .map(|d| d.get_field("title").unwrap().as_text().unwrap())
            .collect();
        assert_eq!(titles, vec!["first", "second", "third"]);

        let generations: Vec<u64> = reader
            .sub_segments()
            .iter()
            .map(|s| s.info.generation)
            .collect();
        assert_eq!(generations, vec![0, 1, 2]);
    }
}
