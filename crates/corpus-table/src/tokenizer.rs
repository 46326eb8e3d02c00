//! Reference tokenizer.
//!
//! Real pipelines may plug a lemmatizer or a language-specific segmenter in
//! behind [`Tokenizer`]; the table builders only ever see the normalized
//! strings it returns.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use unicode_segmentation::UnicodeSegmentation;

/// Turns raw text into normalized word tokens.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Splits on Unicode word boundaries, lowercases, and drops anything that is
/// not alphanumeric (punctuation, elision marks, apostrophes).
#[derive(Clone, Debug, Default)]
pub struct WordTokenizer {
    stopwords: HashSet<String>,
}

impl WordTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the given words after normalization.
    pub fn with_stopwords<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stopwords.extend(
            words
                .into_iter()
                .filter_map(|w| normalize_token(w.as_ref())),
        );
        self
    }

    /// Load a stopword list with one word per line. Blank lines and lines
    /// starting with `#` are ignored.
    pub fn load_stopwords(self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read stopword list {}", path.display()))?;
        let words = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));
        Ok(self.with_stopwords(words))
    }

    pub fn stopword_count(&self) -> usize {
        self.stopwords.len()
    }
}

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .filter_map(normalize_token)
            .filter(|token| !self.stopwords.contains(token))
            .collect()
    }
}

fn normalize_token(raw: &str) -> Option<String> {
    let token: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    if token.is_empty() { None } else { Some(token) }
}
