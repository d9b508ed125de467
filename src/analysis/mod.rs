//! Text analysis pipeline: tokenizers, filters, and analyzers.
//!
//! The analyzer is the pluggable text-analysis function applied to field
//! text while a document operation is indexed.

pub mod analyzer;
pub mod filter;
pub mod token;
pub mod tokenizer;

pub use analyzer::{Analyzer, KeywordAnalyzer, PipelineAnalyzer, StandardAnalyzer};
pub use token::{Token, TokenStream};
