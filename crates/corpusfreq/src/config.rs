use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Result, bail};
use corpus_stats::{Adjustment, ComparisonOptions, HomogeneityOptions};
use corpus_table::LoadMode;
use corpus_types::DocumentId;

pub const DEFAULT_EXTENSION: &str = "txt";
pub const DEFAULT_LEVEL: f64 = 0.95;
pub const DEFAULT_INTERVAL_WORDS: usize = 20;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// What to do with documents that tokenize to nothing.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EmptyDocumentPolicy {
    /// Keep them as all-zero columns.
    #[default]
    Include,
    /// Leave them out and record a skip.
    Skip,
}

/// Which document pairs get a word-by-word comparison.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum ComparisonPlan {
    /// Compare the two documents when the corpus has exactly two, else none.
    #[default]
    Auto,
    AllPairs,
    Pairs(Vec<(DocumentId, DocumentId)>),
}

impl ComparisonPlan {
    /// An explicit list of pairs. A pair naming one document twice is an
    /// error; a pair seen before, in either order, is dropped.
    pub fn pairs(pairs: impl IntoIterator<Item = (DocumentId, DocumentId)>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for (a, b) in pairs {
            if a == b {
                bail!("cannot compare {a} with itself");
            }
            let key = if a <= b {
                (a.clone(), b.clone())
            } else {
                (b.clone(), a.clone())
            };
            if seen.insert(key) {
                kept.push((a, b));
            }
        }
        Ok(ComparisonPlan::Pairs(kept))
    }
}

/// Everything one analysis run needs. Built by the CLI and passed down
/// explicitly; nothing in the pipeline reads the environment.
#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    pub input_dir: PathBuf,
    pub extension: String,
    pub load_mode: LoadMode,
    pub stopwords: Option<PathBuf>,
    pub parallel: bool,
    pub empty_documents: EmptyDocumentPolicy,
    pub comparisons: ComparisonPlan,
    pub homogeneity: HomogeneityOptions,
    pub proportion: ComparisonOptions,
    /// Adjusted p-values reported next to the raw ones; off unless asked for.
    pub adjustment: Option<Adjustment>,
    /// Confidence level for Clopper-Pearson intervals.
    pub level: f64,
    /// Intervals are reported for this many of the most frequent words.
    pub interval_words: usize,
}

impl AnalysisConfig {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            extension: DEFAULT_EXTENSION.to_string(),
            load_mode: LoadMode::default(),
            stopwords: None,
            parallel: false,
            empty_documents: EmptyDocumentPolicy::default(),
            comparisons: ComparisonPlan::default(),
            homogeneity: HomogeneityOptions::default(),
            proportion: ComparisonOptions::default(),
            adjustment: None,
            level: DEFAULT_LEVEL,
            interval_words: DEFAULT_INTERVAL_WORDS,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServeConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_pairs_drop_repeats_in_either_order() {
        let plan = ComparisonPlan::pairs([
            ("iliad".into(), "odyssey".into()),
            ("odyssey".into(), "iliad".into()),
            ("iliad".into(), "theogony".into()),
            ("iliad".into(), "odyssey".into()),
        ])
        .unwrap();
        assert_eq!(
            plan,
            ComparisonPlan::Pairs(vec![
                ("iliad".into(), "odyssey".into()),
                ("iliad".into(), "theogony".into()),
            ])
        );
    }

    #[test]
    fn a_document_is_not_compared_with_itself() {
        let err = ComparisonPlan::pairs([("iliad".into(), "iliad".into())]).unwrap_err();
        assert!(err.to_string().contains("itself"));
    }
}
