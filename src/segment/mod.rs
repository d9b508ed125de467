//! Segment layout: file naming, writer configuration, and metadata.
//!
//! A form's embedded index is a sequence of sub-segments, one per flush or
//! per absorbed peer. Each sub-segment `seg_{generation:06}` carries four
//! sections: stored documents (`docs`), postings (`post`), delete terms
//! (`del`), and JSON metadata (`meta`). In compound mode the four sections
//! are bundled into a single `.cmp` container file.

pub mod reader;
pub mod writer;

use serde::{Deserialize, Serialize};

pub use reader::{SegmentReader, SubSegment};
pub use writer::SegmentWriter;

/// Prefix of every segment file name.
pub const SEGMENT_PREFIX: &str = "seg";

/// Extension of the stored-documents section.
pub const DOCS_EXTENSION: &str = "docs";

/// Extension of the postings section.
pub const POSTINGS_EXTENSION: &str = "post";

/// Extension of the delete-terms section.
pub const DELETES_EXTENSION: &str = "del";

/// Extension of the metadata section.
pub const META_EXTENSION: &str = "meta";

/// Extension of a compound container bundling all four sections.
pub const COMPOUND_EXTENSION: &str = "cmp";

/// Magic number at the start of a compound container.
pub const COMPOUND_MAGIC: u32 = 0x434D_5031; // "CMP1"

/// Policy controlling which historical commits a segment set retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionPolicy {
    /// Keep only the most recent commit.
    #[default]
    KeepOnlyLastCommit,

    /// Keep every commit.
    KeepAllCommits,
}

/// Configuration for a [`SegmentWriter`].
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentWriterConfig {
    /// Maximum number of tokens indexed per text field. `None` means
    /// unlimited.
    pub max_field_length: Option<u32>,

    /// Bundle the section files of each sub-segment into one container.
    pub use_compound: bool,

    /// Commit retention policy recorded in segment metadata.
    pub deletion_policy: DeletionPolicy,
}

impl Default for SegmentWriterConfig {
    fn default() -> Self {
        SegmentWriterConfig {
            max_field_length: None,
            use_compound: true,
            deletion_policy: DeletionPolicy::default(),
        }
    }
}

/// Metadata describing one sub-segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Segment identifier, derived from the generation at write time.
    pub segment_id: String,

    /// Number of stored documents in this sub-segment.
    pub doc_count: u64,

    /// Generation assigned when the sub-segment was written.
    pub generation: u64,

    /// Whether the sub-segment carries delete terms.
    pub has_deletions: bool,

    /// Commit retention policy in effect when the sub-segment was written.
    pub deletion_policy: DeletionPolicy,
}

/// Build the file name for a segment generation and extension.
pub fn segment_file_name(generation: u64, extension: &str) -> String {
    format!("{SEGMENT_PREFIX}_{generation:06}.{extension}")
}

/// Parse a segment file name into its generation and extension.
///
/// Returns `None` for names that do not follow the segment naming scheme.
pub fn parse_segment_file_name(name: &str) -> Option<(u64, &str)> {
    let rest = name.strip_prefix(SEGMENT_PREFIX)?.strip_prefix('_')?;
    let (digits, extension) = rest.split_once('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let generation = digits.parse().ok()?;
    Some((generation, extension))
}
