//! Shared types for corpus frequency analysis.
//!
//! Everything here is plain data: document identifiers, borrowed count views,
//! and the read-only records produced by the significance tests. Builders
//! and statistics live in `corpus-table` and `corpus-stats`; this crate only
//! fixes the vocabulary they exchange.
//!
//! Use [`DocumentId`] to key documents, [`WordCount`] to inspect table rows,
//! and [`HomogeneityResult`], [`WordComparison`] and [`ConfidenceInterval`]
//! to read test output. Anything a run declined to process is recorded as a
//! [`Skipped`] entry with a [`SkipReason`].
//!
//! ```rust
//! use corpus_types::{ConfidenceInterval, DocumentId, Significance};
//!
//! let id = DocumentId::from("iliad");
//! assert_eq!(id.as_str(), "iliad");
//! assert!(Significance::default().is_significant(0.01));
//!
//! let ci = ConfidenceInterval { lower: 0.1, upper: 0.4, level: 0.95 };
//! assert!(ci.contains(0.25));
//! ```

use std::borrow::Borrow;
use std::fmt;

/// Opaque document identifier, typically a file stem.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for DocumentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A word and its raw count, borrowed from a frequency table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WordCount<'a> {
    pub word: &'a str,
    pub count: u64,
}

/// Significance threshold applied to every reported p-value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Significance {
    pub alpha: f64,
}

impl Significance {
    pub const DEFAULT_ALPHA: f64 = 0.05;

    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    /// `p < alpha`. NaN is never significant.
    pub fn is_significant(&self, p_value: f64) -> bool {
        p_value < self.alpha
    }
}

impl Default for Significance {
    fn default() -> Self {
        Self {
            alpha: Self::DEFAULT_ALPHA,
        }
    }
}

/// The three comparisons the significance engine knows how to run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TestKind {
    Homogeneity,
    WordProportion,
    ConfidenceInterval,
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TestKind::Homogeneity => "chi-square homogeneity",
            TestKind::WordProportion => "word proportion",
            TestKind::ConfidenceInterval => "confidence interval",
        })
    }
}

/// How a homogeneity p-value was obtained.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HomogeneityMethod {
    /// Upper tail of the chi-square distribution.
    Asymptotic,
    /// Fixed-margin simulation, used when expected counts are too sparse.
    MonteCarlo { resamples: u32 },
}

impl fmt::Display for HomogeneityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HomogeneityMethod::Asymptotic => f.write_str("asymptotic"),
            HomogeneityMethod::MonteCarlo { resamples } => {
                write!(f, "monte carlo ({resamples} resamples)")
            }
        }
    }
}

/// Outcome of a chi-square homogeneity test across documents.
#[derive(Clone, Debug, PartialEq)]
pub struct HomogeneityResult {
    pub statistic: f64,
    /// `None` for simulated p-values, which do not depend on df.
    pub degrees_of_freedom: Option<u32>,
    pub p_value: f64,
    pub method: HomogeneityMethod,
    /// Number of words left after dropping all-zero columns.
    pub words_tested: usize,
    pub significant: bool,
}

/// Proportion test for one word between two documents.
#[derive(Clone, Debug, PartialEq)]
pub struct WordComparison {
    pub word: String,
    pub count_a: u64,
    pub total_a: u64,
    pub count_b: u64,
    pub total_b: u64,
    pub p_value: f64,
    pub significant: bool,
}

impl WordComparison {
    pub fn proportion_a(&self) -> f64 {
        ratio(self.count_a, self.total_a)
    }

    pub fn proportion_b(&self) -> f64 {
        ratio(self.count_b, self.total_b)
    }
}

/// Exact binomial interval for a proportion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub level: f64,
}

impl ConfidenceInterval {
    pub fn contains(&self, p: f64) -> bool {
        self.lower <= p && p <= self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// What was skipped: a whole document or a single test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SkipScope {
    Document,
    Test(TestKind),
}

/// Why a document or test was left out of the results.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SkipReason {
    Unreadable(String),
    InvalidUtf8,
    EmptyDocument,
    InsufficientData(String),
    InvalidInput(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unreadable(err) => write!(f, "unreadable: {err}"),
            SkipReason::InvalidUtf8 => f.write_str("not valid UTF-8"),
            SkipReason::EmptyDocument => f.write_str("document has no tokens"),
            SkipReason::InsufficientData(why) => write!(f, "insufficient data: {why}"),
            SkipReason::InvalidInput(why) => write!(f, "invalid input: {why}"),
        }
    }
}

/// An explicit, attributable skip.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Skipped {
    pub scope: SkipScope,
    pub subject: String,
    pub reason: SkipReason,
}

impl Skipped {
    pub fn document(subject: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            scope: SkipScope::Document,
            subject: subject.into(),
            reason,
        }
    }

    pub fn test(kind: TestKind, subject: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            scope: SkipScope::Test(kind),
            subject: subject.into(),
            reason,
        }
    }
}

impl fmt::Display for Skipped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            SkipScope::Document => write!(f, "document {}: {}", self.subject, self.reason),
            SkipScope::Test(kind) => write!(f, "{kind} test {}: {}", self.subject, self.reason),
        }
    }
}

/// `count / total`, defined as 0.0 when `total` is zero.
pub fn ratio(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}
