//! Token filter implementations.

use std::collections::HashSet;

use lazy_static::lazy_static;

use crate::analysis::token::TokenStream;
use crate::error::Result;

lazy_static! {
    static ref DEFAULT_STOP_WORDS: HashSet<&'static str> = [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
        "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
        "these", "they", "this", "to", "was", "will", "with",
    ]
    .iter()
    .copied()
    .collect();
}

/// Trait for filters that transform a token stream.
pub trait Filter: Send + Sync {
    /// Apply this filter to a token stream.
    fn filter(&self, tokens: TokenStream) -> Result<TokenStream>;

    /// Get the name of this filter (for debugging and configuration).
    fn name(&self) -> &'static str;
}

/// A filter that lowercases token text.
#[derive(Debug, Clone, Default)]
pub struct LowercaseFilter;

impl LowercaseFilter {
    /// Create a new lowercase filter.
    pub fn new() -> Self {
        LowercaseFilter
    }
}

impl Filter for LowercaseFilter {
    fn filter(&self, tokens: TokenStream) -> Result<TokenStream> {
        Ok(Box::new(tokens.map(|mut token| {
            token.text = token.text.to_lowercase();
            token
        })))
    }

    fn name(&self) -> &'static str {
        "lowercase"
    }
}

/// A filter that removes stop words from the stream.
#[derive(Debug, Clone)]
pub struct StopFilter {
    stop_words: HashSet<String>,
}

impl StopFilter {
    /// Create a stop filter with the default English stop-word set.
    pub fn new() -> Self {
        StopFilter {
            stop_words: DEFAULT_STOP_WORDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Create a stop filter with a custom word list.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StopFilter {
            stop_words: words.into_iter().map(|s| s.into()).collect(),
        }
    }
}

impl Default for StopFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for StopFilter {
    fn filter(&self, tokens: TokenStream) -> Result<TokenStream> {
        let stop_words = self.stop_words.clone();
        Ok(Box::new(
            tokens.filter(move |token| !stop_words.contains(token.text.as_str())),
        ))
    }

    fn name(&self) -> &'static str {
        "stop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::token::Token;

    fn stream(words: &[&str]) -> TokenStream {
        let tokens: Vec<Token> = words
            .iter()
            .enumerate()
            .map(|(i, w)| Token::new(*w, i))
            .collect();
        Box::new(tokens.into_iter())
    }

    #[test]
    fn test_lowercase_filter() {
        let filter = LowercaseFilter::new();
        let tokens: Vec<Token> = filter.filter(stream(&["Hello", "WORLD"])).unwrap().collect();

        assert_eq!(tokens[0].text, "hello");
        assert_eq!(tokens[1].text, "world");
    }

    #[test]
    fn test_stop_filter_default_words() {
        let filter = StopFilter::new();
        let tokens: Vec<Token> = filter
            .filter(stream(&["the", "quick", "and", "lazy"]))
            .unwrap()
            .collect();

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "quick");
        assert_eq!(tokens[1].text, "lazy");
    }

    #[test]
    fn test_stop_filter_custom_words() {
        let filter = StopFilter::from_words(vec!["quick"]);
        let tokens: Vec<Token> = filter
            .filter(stream(&["the", "quick", "fox"]))
            .unwrap()
            .collect();

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "the");
        assert_eq!(tokens[1].text, "fox");
    }
}
