//! Word frequency tables for single documents and whole corpora.
//!
//! A run reads each document, turns it into tokens through a [`Tokenizer`],
//! counts them into a [`FrequencyTable`], and folds every table into one
//! [`CorpusTable`] (word x document -> count). Tables are immutable once
//! built; the corpus table is immutable once [`CorpusBuilder::finish`]
//! returns.
//!
//! # Ordering
//! Both table kinds list words by count descending. Ties are broken
//! lexicographically by word so output never depends on hash order.
//!
//! # Example
//! ```rust
//! use corpus_table::{CorpusTable, FrequencyTable, Tokenizer, WordTokenizer};
//!
//! # fn main() -> Result<(), corpus_table::CorpusError> {
//! let tokenizer = WordTokenizer::new();
//! let a = FrequencyTable::build("a", tokenizer.tokenize("The cat sat."));
//! let b = FrequencyTable::build("b", tokenizer.tokenize("The dog ran."));
//!
//! let corpus = CorpusTable::aggregate([&a, &b])?;
//! assert_eq!(corpus.count("the", "a"), 1);
//! assert_eq!(corpus.count("cat", "b"), 0);
//! assert_eq!(corpus.word_count(), 5);
//! # Ok(()) }
//! ```
//!
//! Document discovery and reading live in [`loader`]; callers choose between
//! memory-mapped files and owned buffers with [`LoadMode`].

pub mod corpus;
pub mod frequency;
pub mod loader;
pub mod tokenizer;

use corpus_types::DocumentId;
use thiserror::Error;

pub use corpus::{CorpusBuilder, CorpusRow, CorpusTable, DocumentColumn};
pub use frequency::{DocumentStats, FrequencyTable};
pub use loader::{DocumentFile, DocumentText, LoadMode, discover};
pub use tokenizer::{Tokenizer, WordTokenizer};

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("document id {0} appears more than once in this run")]
    DuplicateDocument(DocumentId),
    #[error("unknown document: {0}")]
    UnknownDocument(String),
}
