//! Token-bounded text windows.
//!
//! [`tokenize`] splits text at Unicode word boundaries (UAX #29) and keeps
//! every non-whitespace segment: words, numbers and single punctuation marks.
//! Apostrophes between letters stay inside the word. [`TextChunker`]
//! partitions that token sequence into contiguous windows of at most
//! `max_tokens` tokens.

use unicode_segmentation::UnicodeSegmentation;

use crate::error::Result;
use crate::PipelineError;

/// Default window size in tokens.
pub const DEFAULT_CHUNK_TOKENS: usize = 2000;

/// Split text into lexical tokens.
///
/// ```
/// use podcast_pipeline::chunker::tokenize;
///
/// assert_eq!(tokenize("Don't panic, Arthur!"), vec!["Don't", "panic", ",", "Arthur", "!"]);
/// ```
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split_word_bounds()
        .filter(|segment| !segment.trim().is_empty())
        .collect()
}

/// Number of lexical tokens in `text`.
pub fn count_tokens(text: &str) -> usize {
    tokenize(text).len()
}

/// Splits text into windows of at most `max_tokens` tokens.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    max_tokens: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_CHUNK_TOKENS,
        }
    }
}

impl TextChunker {
    /// Create a chunker; `max_tokens` must be positive.
    pub fn new(max_tokens: usize) -> Result<Self> {
        if max_tokens == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunk size must be at least one token".to_string(),
            ));
        }
        Ok(Self { max_tokens })
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Partition `text` into token windows, each rendered by joining its
    /// tokens with a single space.
    ///
    /// Empty or whitespace-only text yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        tokenize(text)
            .chunks(self.max_tokens)
            .map(|window| window.join(" "))
            .collect()
    }
}
