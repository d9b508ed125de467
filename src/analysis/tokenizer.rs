//! Tokenizer implementations for breaking text into tokens.

use regex::Regex;

use crate::analysis::token::{Token, TokenStream};
use crate::error::{Result, TsumugiError};

/// Trait for tokenizers that convert text into tokens.
pub trait Tokenizer: Send + Sync {
    /// Tokenize the given text into a stream of tokens.
    fn tokenize(&self, text: &str) -> Result<TokenStream>;

    /// Get the name of this tokenizer (for debugging and configuration).
    fn name(&self) -> &'static str;
}

/// A tokenizer that extracts word-character runs using a regular expression.
pub struct RegexTokenizer {
    pattern: Regex,
}

impl RegexTokenizer {
    /// Create a tokenizer matching `\w+`.
    pub fn new() -> Result<Self> {
        Self::with_pattern(r"\w+")
    }

    /// Create a tokenizer with a custom pattern.
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| TsumugiError::analysis(format!("Invalid token pattern: {e}")))?;
        Ok(RegexTokenizer { pattern })
    }
}

impl Tokenizer for RegexTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        let tokens: Vec<Token> = self
            .pattern
            .find_iter(text)
            .enumerate()
            .map(|(position, m)| Token::with_offsets(m.as_str(), position, m.start(), m.end()))
            .collect();

        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "regex"
    }
}

/// A tokenizer that splits on whitespace.
#[derive(Debug, Clone, Default)]
pub struct WhitespaceTokenizer;

impl WhitespaceTokenizer {
    /// Create a new whitespace tokenizer.
    pub fn new() -> Self {
        WhitespaceTokenizer
    }
}

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        let mut tokens = Vec::new();
        let mut position = 0;
        let mut start = None;

        for (index, ch) in text.char_indices() {
            if ch.is_whitespace() {
                if let Some(token_start) = start.take() {
                    tokens.push(Token::with_offsets(
                        &text[token_start..index],
                        position,
                        token_start,
                        index,
                    ));
                    position += 1;
                }
            } else if start.is_none() {
                start = Some(index);
            }
        }
        if let Some(token_start) = start {
            tokens.push(Token::with_offsets(
                &text[token_start..],
                position,
                token_start,
                text.len(),
            ));
        }

        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "whitespace"
    }
}

/// A tokenizer that treats the entire input as a single token.
#[derive(Debug, Clone, Default)]
pub struct WholeTokenizer;

impl WholeTokenizer {
    /// Create a new whole-text tokenizer.
    pub fn new() -> Self {
        WholeTokenizer
    }
}

impl Tokenizer for WholeTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        if text.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }

        let token = Token::with_offsets(text, 0, 0, text.len());
        Ok(Box::new(std::iter::once(token)))
    }

    fn name(&self) -> &'static str {
        "whole"
    }
}
