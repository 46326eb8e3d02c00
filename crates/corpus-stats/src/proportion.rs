use corpus_table::CorpusTable;
use corpus_types::{DocumentId, Significance, Skipped, TestKind, WordComparison};
use tracing::{debug, warn};

use crate::StatsError;
use crate::correction::Adjustment;
use crate::special::{chi_square_sf, ln_choose};

/// Relative tolerance when collecting tables "as or less likely" than the
/// observed one in the Fisher test.
const FISHER_REL_TOL: f64 = 1.0 + 1e-7;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ProportionMethod {
    /// 2x2 chi-square with Yates continuity correction.
    #[default]
    ChiSquareYates,
    /// Two-sided Fisher exact test.
    FisherExact,
}

impl ProportionMethod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "chisq" | "chi-square" | "yates" => Some(ProportionMethod::ChiSquareYates),
            "fisher" => Some(ProportionMethod::FisherExact),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ComparisonOptions {
    pub method: ProportionMethod,
    pub significance: Significance,
}

/// Ranked per-word proportion tests between two documents.
#[derive(Clone, Debug, PartialEq)]
pub struct WordComparisonReport {
    pub document_a: DocumentId,
    pub document_b: DocumentId,
    /// Ascending by p-value, ties by word.
    pub comparisons: Vec<WordComparison>,
    pub skipped: Vec<Skipped>,
    pub significance: Significance,
}

impl WordComparisonReport {
    pub fn tests_run(&self) -> usize {
        self.comparisons.len()
    }

    pub fn significant_count(&self) -> usize {
        self.comparisons.iter().filter(|c| c.significant).count()
    }

    /// p-values adjusted over every word tested, in ranking order. The raw
    /// p-values and `significant` flags are left as they are.
    pub fn adjusted_p_values(&self, adjustment: Adjustment) -> Vec<f64> {
        let raw: Vec<f64> = self.comparisons.iter().map(|c| c.p_value).collect();
        adjustment.apply(&raw)
    }

    /// Caveat about running many uncorrected tests, if more than one ran.
    pub fn multiple_comparisons_note(&self) -> Option<String> {
        let m = self.tests_run();
        if m < 2 {
            return None;
        }
        let expected = m as f64 * self.significance.alpha;
        Some(format!(
            "{m} word-level tests at alpha {}: about {expected:.1} would look significant by chance alone. \
             p-values are uncorrected; apply Bonferroni or Benjamini-Hochberg before interpreting.",
            self.significance.alpha
        ))
    }
}

/// p-value for `count_a / total_a` vs `count_b / total_b`.
pub fn test_word_proportion(
    count_a: u64,
    total_a: u64,
    count_b: u64,
    total_b: u64,
    method: ProportionMethod,
) -> Result<f64, StatsError> {
    if total_a == 0 || total_b == 0 {
        return Err(StatsError::InvalidInput(
            "both documents need a positive token total".into(),
        ));
    }
    if count_a > total_a || count_b > total_b {
        return Err(StatsError::InvalidInput(
            "count exceeds document total".into(),
        ));
    }
    match method {
        ProportionMethod::ChiSquareYates => yates_p_value(count_a, total_a, count_b, total_b),
        ProportionMethod::FisherExact => Ok(fisher_p_value(count_a, total_a, count_b, total_b)),
    }
}

fn yates_p_value(
    count_a: u64,
    total_a: u64,
    count_b: u64,
    total_b: u64,
) -> Result<f64, StatsError> {
    let successes = count_a + count_b;
    let n = total_a + total_b;
    if successes == 0 || successes == n {
        // Pooled proportion is 0 or 1: both documents agree exactly.
        return Ok(1.0);
    }
    let n = n as f64;
    let observed = [
        [count_a as f64, (total_a - count_a) as f64],
        [count_b as f64, (total_b - count_b) as f64],
    ];
    let row_sums = [total_a as f64, total_b as f64];
    let col_sums = [successes as f64, n - successes as f64];

    let deviation = (observed[0][0] - row_sums[0] * col_sums[0] / n).abs();
    let correction = deviation.min(0.5);

    let mut statistic = 0.0;
    for (row, row_sum) in row_sums.iter().enumerate() {
        for (col, col_sum) in col_sums.iter().enumerate() {
            let expected = row_sum * col_sum / n;
            let diff = (observed[row][col] - expected).abs() - correction;
            statistic += diff * diff / expected;
        }
    }
    chi_square_sf(statistic, 1.0)
}

fn fisher_p_value(count_a: u64, total_a: u64, count_b: u64, total_b: u64) -> f64 {
    // Hypergeometric on the first column: m successes, n failures, k draws
    // (the first document's tokens).
    let m = count_a + count_b;
    let n = (total_a - count_a) + (total_b - count_b);
    let k = total_a;
    let lo = k.saturating_sub(n);
    let hi = k.min(m);

    let log_pmf = |x: u64| ln_choose(m, x) + ln_choose(n, k - x) - ln_choose(m + n, k);
    let logs: Vec<f64> = (lo..=hi).map(log_pmf).collect();
    let max = logs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = logs.iter().map(|l| (l - max).exp()).collect();
    let total: f64 = weights.iter().sum();
    let observed = weights[(count_a - lo) as usize];

    let tail: f64 = weights
        .iter()
        .filter(|w| **w <= observed * FISHER_REL_TOL)
        .sum();
    (tail / total).min(1.0)
}

/// Run the proportion test for every word that occurs in either document.
///
/// Fails when either document is unknown or has no tokens. Individual word
/// tests that cannot run are recorded in [`WordComparisonReport::skipped`].
pub fn compare_words(
    table: &CorpusTable,
    document_a: &str,
    document_b: &str,
    options: &ComparisonOptions,
) -> Result<WordComparisonReport, StatsError> {
    let column = |id: &str| {
        table
            .document_position(id)
            .map(|pos| (pos, &table.documents()[pos]))
            .ok_or_else(|| StatsError::UnknownDocument(id.to_string()))
    };
    let (col_a, doc_a) = column(document_a)?;
    let (col_b, doc_b) = column(document_b)?;
    for doc in [doc_a, doc_b] {
        if doc.total_tokens == 0 {
            return Err(StatsError::EmptyDocument(doc.id.clone()));
        }
    }

    let mut comparisons = Vec::new();
    let mut skipped = Vec::new();
    for row in table.rows() {
        let count_a = row.count_at(col_a);
        let count_b = row.count_at(col_b);
        if count_a == 0 && count_b == 0 {
            continue;
        }
        match test_word_proportion(
            count_a,
            doc_a.total_tokens,
            count_b,
            doc_b.total_tokens,
            options.method,
        ) {
            Ok(p_value) => comparisons.push(WordComparison {
                word: row.word().to_string(),
                count_a,
                total_a: doc_a.total_tokens,
                count_b,
                total_b: doc_b.total_tokens,
                p_value,
                significant: options.significance.is_significant(p_value),
            }),
            Err(err) => {
                warn!("skipping proportion test for {}: {err}", row.word());
                skipped.push(Skipped::test(
                    TestKind::WordProportion,
                    row.word(),
                    err.skip_reason(),
                ));
            }
        }
    }

    comparisons.sort_by(|a, b| {
        a.p_value
            .total_cmp(&b.p_value)
            .then_with(|| a.word.cmp(&b.word))
    });
    debug!(
        "{} vs {}: {} word tests, {} skipped",
        doc_a.id,
        doc_b.id,
        comparisons.len(),
        skipped.len()
    );

    Ok(WordComparisonReport {
        document_a: doc_a.id.clone(),
        document_b: doc_b.id.clone(),
        comparisons,
        skipped,
        significance: options.significance,
    })
}
