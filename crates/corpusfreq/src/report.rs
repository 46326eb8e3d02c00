//! Serializable views of run results, shared by the JSON export and the
//! HTTP handlers.

use corpus_stats::{Adjustment, WordComparisonReport};
use corpus_types::{SkipScope, Skipped, WordComparison};
use serde::Serialize;

use crate::pipeline::{DocumentSummary, HomogeneityOutcome, RunReport, WordInterval};

#[derive(Debug, Serialize)]
pub struct DocumentView {
    pub id: String,
    pub path: String,
    pub total_tokens: u64,
    pub distinct_words: usize,
    pub hapax_legomena: usize,
    pub type_token_ratio: f64,
}

impl From<&DocumentSummary> for DocumentView {
    fn from(doc: &DocumentSummary) -> Self {
        Self {
            id: doc.id.to_string(),
            path: doc.path.display().to_string(),
            total_tokens: doc.stats.total_tokens,
            distinct_words: doc.stats.distinct_words,
            hapax_legomena: doc.stats.hapax_legomena,
            type_token_ratio: doc.stats.type_token_ratio,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HomogeneityView {
    pub documents: Vec<String>,
    pub statistic: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degrees_of_freedom: Option<u32>,
    pub p_value: f64,
    pub method: String,
    pub words_tested: usize,
    pub significant: bool,
}

impl From<&HomogeneityOutcome> for HomogeneityView {
    fn from(outcome: &HomogeneityOutcome) -> Self {
        let result = &outcome.result;
        Self {
            documents: outcome.documents.iter().map(ToString::to_string).collect(),
            statistic: result.statistic,
            degrees_of_freedom: result.degrees_of_freedom,
            p_value: result.p_value,
            method: result.method.to_string(),
            words_tested: result.words_tested,
            significant: result.significant,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ComparisonView {
    pub word: String,
    pub count_a: u64,
    pub total_a: u64,
    pub proportion_a: f64,
    pub count_b: u64,
    pub total_b: u64,
    pub proportion_b: f64,
    pub p_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_adjusted: Option<f64>,
    pub significant: bool,
}

impl From<&WordComparison> for ComparisonView {
    fn from(c: &WordComparison) -> Self {
        Self {
            word: c.word.clone(),
            count_a: c.count_a,
            total_a: c.total_a,
            proportion_a: c.proportion_a(),
            count_b: c.count_b,
            total_b: c.total_b,
            proportion_b: c.proportion_b(),
            p_value: c.p_value,
            p_adjusted: None,
            significant: c.significant,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PairView {
    pub document_a: String,
    pub document_b: String,
    pub alpha: f64,
    pub tests_run: usize,
    pub significant_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<String>,
    pub comparisons: Vec<ComparisonView>,
    pub skipped: Vec<SkippedView>,
}

impl PairView {
    /// View of a comparison report keeping at most `limit` ranked words.
    /// Adjusted p-values are computed over every word tested, not just the
    /// ones kept.
    pub fn new(
        report: &WordComparisonReport,
        limit: Option<usize>,
        adjustment: Option<Adjustment>,
    ) -> Self {
        let limit = limit.unwrap_or(report.comparisons.len());
        let adjusted = adjustment.map(|a| report.adjusted_p_values(a));
        Self {
            document_a: report.document_a.to_string(),
            document_b: report.document_b.to_string(),
            alpha: report.significance.alpha,
            tests_run: report.tests_run(),
            significant_count: report.significant_count(),
            note: report.multiple_comparisons_note(),
            adjustment: adjustment.map(|a| a.to_string()),
            comparisons: report
                .comparisons
                .iter()
                .take(limit)
                .enumerate()
                .map(|(i, c)| ComparisonView {
                    p_adjusted: adjusted.as_ref().map(|p| p[i]),
                    ..ComparisonView::from(c)
                })
                .collect(),
            skipped: report.skipped.iter().map(SkippedView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IntervalView {
    pub word: String,
    pub document: String,
    pub count: u64,
    pub total: u64,
    pub proportion: f64,
    pub lower: f64,
    pub upper: f64,
    pub level: f64,
}

impl From<&WordInterval> for IntervalView {
    fn from(w: &WordInterval) -> Self {
        Self {
            word: w.word.clone(),
            document: w.document.to_string(),
            count: w.count,
            total: w.total,
            proportion: corpus_types::ratio(w.count, w.total),
            lower: w.interval.lower,
            upper: w.interval.upper,
            level: w.interval.level,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SkippedView {
    pub scope: String,
    pub subject: String,
    pub reason: String,
}

impl From<&Skipped> for SkippedView {
    fn from(s: &Skipped) -> Self {
        let scope = match &s.scope {
            SkipScope::Document => "document".to_string(),
            SkipScope::Test(kind) => format!("{kind} test"),
        };
        Self {
            scope,
            subject: s.subject.clone(),
            reason: s.reason.to_string(),
        }
    }
}

/// The whole run as written to `report.json`. Per-word counts live in the
/// CSV export instead.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub words: usize,
    pub documents: Vec<DocumentView>,
    pub homogeneity: Vec<HomogeneityView>,
    pub comparisons: Vec<PairView>,
    pub intervals: Vec<IntervalView>,
    pub skipped: Vec<SkippedView>,
}

impl From<&RunReport> for RunSummary {
    fn from(report: &RunReport) -> Self {
        Self {
            words: report.table.word_count(),
            documents: report.documents.iter().map(DocumentView::from).collect(),
            homogeneity: report.homogeneity.iter().map(HomogeneityView::from).collect(),
            comparisons: report
                .comparisons
                .iter()
                .map(|c| PairView::new(c, None, report.adjustment))
                .collect(),
            intervals: report.intervals.iter().map(IntervalView::from).collect(),
            skipped: report.skipped.iter().map(SkippedView::from).collect(),
        }
    }
}
