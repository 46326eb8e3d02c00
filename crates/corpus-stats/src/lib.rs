//! Significance tests over corpus word counts.
//!
//! Three stateless operations, each a pure function of its inputs:
//!
//! 1. [`homogeneity`]: Pearson chi-square test of whether documents share one
//!    word distribution. Sparse tables (more than 20% of expected counts
//!    below 5) switch to a seeded fixed-margin Monte Carlo p-value.
//! 2. [`test_word_proportion`] / [`compare_words`]: two-sample proportion
//!    test per word, ranked by p-value. No multiple-comparison correction is
//!    applied unless the caller asks for an [`Adjustment`], and even then the
//!    adjusted values sit next to the raw ones.
//! 3. [`confidence_interval`]: Clopper-Pearson exact binomial interval.
//!
//! Failed preconditions come back as [`StatsError`] so a caller can record
//! the test as skipped and move on.
//!
//! # Example
//! ```rust
//! use corpus_stats::{HomogeneityOptions, confidence_interval, test_homogeneity};
//!
//! # fn main() -> Result<(), corpus_stats::StatsError> {
//! let result = test_homogeneity(&[100, 0, 0], &[0, 0, 100], &HomogeneityOptions::default())?;
//! assert!(result.significant);
//!
//! let ci = confidence_interval(0, 20, 0.95)?;
//! assert_eq!(ci.lower, 0.0);
//! # Ok(()) }
//! ```

pub mod correction;
pub mod homogeneity;
pub mod interval;
pub mod proportion;
pub mod special;

use corpus_types::{DocumentId, SkipReason};
use thiserror::Error;

pub use correction::{Adjustment, benjamini_hochberg, bonferroni};
pub use homogeneity::{
    DEFAULT_RESAMPLES, DEFAULT_SEED, HomogeneityOptions, corpus_homogeneity, homogeneity,
    test_homogeneity,
};
pub use interval::confidence_interval;
pub use proportion::{
    ComparisonOptions, ProportionMethod, WordComparisonReport, compare_words,
    test_word_proportion,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatsError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown document: {0}")]
    UnknownDocument(String),
    #[error("document {0} has no tokens")]
    EmptyDocument(DocumentId),
    #[error("numeric routine did not converge: {0}")]
    NoConvergence(String),
}

impl StatsError {
    /// How this failure is reported when the test is skipped.
    pub fn skip_reason(&self) -> SkipReason {
        match self {
            StatsError::InsufficientData(why) => SkipReason::InsufficientData(why.clone()),
            StatsError::InvalidInput(why) => SkipReason::InvalidInput(why.clone()),
            StatsError::UnknownDocument(id) => {
                SkipReason::InvalidInput(format!("unknown document {id}"))
            }
            StatsError::EmptyDocument(_) => SkipReason::EmptyDocument,
            StatsError::NoConvergence(why) => {
                SkipReason::InvalidInput(format!("no convergence: {why}"))
            }
        }
    }
}
