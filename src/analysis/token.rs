//! Token types for text analysis.

use serde::{Deserialize, Serialize};

/// A token represents a single unit of text after tokenization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The token's text content.
    pub text: String,

    /// Position in the token stream (0-based).
    pub position: usize,

    /// Byte offset in the original text where the token starts.
    pub start_offset: usize,

    /// Byte offset in the original text where the token ends.
    pub end_offset: usize,
}

impl Token {
    /// Create a new token without offset information.
    pub fn new<S: Into<String>>(text: S, position: usize) -> Self {
        let text = text.into();
        Token {
            text,
            position,
            start_offset: 0,
            end_offset: 0,
        }
    }

    /// Create a new token with byte offsets into the original text.
    pub fn with_offsets<S: Into<String>>(
        text: S,
        position: usize,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset,
            end_offset,
        }
    }
}

/// A stream of tokens produced by a tokenizer or filter.
pub type TokenStream = Box<dyn Iterator<Item = Token>>;
