use corpus_table::{CorpusError, CorpusTable};
use corpus_types::{HomogeneityMethod, HomogeneityResult, Significance};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Hypergeometric};
use tracing::debug;

use crate::StatsError;
use crate::special::chi_square_sf;

/// Relative slack when comparing simulated statistics with the observed one.
const STATISTIC_SLACK: f64 = 1.0 - 64.0 * f64::EPSILON;

pub const DEFAULT_RESAMPLES: u32 = 2000;
pub const DEFAULT_SEED: u64 = 0x5EED_C0DE;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HomogeneityOptions {
    /// Number of simulated tables for the Monte Carlo fallback.
    pub resamples: u32,
    pub seed: u64,
    /// Expected counts below this are "low".
    pub min_expected: f64,
    /// Fall back to simulation when more than this share of cells is low.
    pub max_low_fraction: f64,
    pub significance: Significance,
}

impl Default for HomogeneityOptions {
    fn default() -> Self {
        Self {
            resamples: DEFAULT_RESAMPLES,
            seed: DEFAULT_SEED,
            min_expected: 5.0,
            max_low_fraction: 0.2,
            significance: Significance::default(),
        }
    }
}

/// Chi-square homogeneity test between two aligned count vectors.
pub fn test_homogeneity(
    counts_a: &[u64],
    counts_b: &[u64],
    options: &HomogeneityOptions,
) -> Result<HomogeneityResult, StatsError> {
    homogeneity(&[counts_a.to_vec(), counts_b.to_vec()], options)
}

/// Homogeneity test across the given documents of a corpus.
pub fn corpus_homogeneity(
    table: &CorpusTable,
    documents: &[&str],
    options: &HomogeneityOptions,
) -> Result<HomogeneityResult, StatsError> {
    let rows = table.contingency(documents).map_err(|err| match err {
        CorpusError::UnknownDocument(id) => StatsError::UnknownDocument(id),
        other => StatsError::InvalidInput(other.to_string()),
    })?;
    homogeneity(&rows, options)
}

/// Chi-square homogeneity test on an r x c table (rows are documents,
/// columns are words). All-zero columns are dropped before testing.
pub fn homogeneity(
    rows: &[Vec<u64>],
    options: &HomogeneityOptions,
) -> Result<HomogeneityResult, StatsError> {
    if rows.len() < 2 {
        return Err(StatsError::InsufficientData(
            "need at least 2 documents".into(),
        ));
    }
    let width = rows[0].len();
    if rows.iter().any(|row| row.len() != width) {
        return Err(StatsError::InvalidInput(
            "count vectors differ in length".into(),
        ));
    }

    let kept: Vec<usize> = (0..width)
        .filter(|col| rows.iter().any(|row| row[*col] > 0))
        .collect();
    if kept.len() < 2 {
        return Err(StatsError::InsufficientData(format!(
            "{} word(s) with non-zero counts, need at least 2",
            kept.len()
        )));
    }

    let observed: Vec<Vec<u64>> = rows
        .iter()
        .map(|row| kept.iter().map(|col| row[*col]).collect())
        .collect();
    let row_sums: Vec<u64> = observed.iter().map(|row| row.iter().sum()).collect();
    let col_sums: Vec<u64> = (0..kept.len())
        .map(|col| observed.iter().map(|row| row[col]).sum())
        .collect();
    let total: u64 = row_sums.iter().sum();
    if total == 0 {
        return Err(StatsError::InsufficientData("total count is zero".into()));
    }
    if let Some(empty) = row_sums.iter().position(|sum| *sum == 0) {
        return Err(StatsError::InsufficientData(format!(
            "document {} has no counts among the tested words",
            empty + 1
        )));
    }

    let expected = expected_counts(&row_sums, &col_sums, total);
    let statistic = pearson(&observed, &expected);

    let cells = expected.len() * kept.len();
    let low = expected
        .iter()
        .flatten()
        .filter(|e| **e < options.min_expected)
        .count();
    let sparse = low as f64 > options.max_low_fraction * cells as f64;

    let (p_value, degrees_of_freedom, method) = if sparse && options.resamples > 0 {
        debug!(
            low_cells = low,
            cells,
            resamples = options.resamples,
            "expected counts too sparse, simulating p-value"
        );
        let p = simulate_p_value(&row_sums, &col_sums, &expected, statistic, options)?;
        (
            p,
            None,
            HomogeneityMethod::MonteCarlo {
                resamples: options.resamples,
            },
        )
    } else {
        let df = ((rows.len() - 1) * (kept.len() - 1)) as u32;
        (
            chi_square_sf(statistic, df as f64)?,
            Some(df),
            HomogeneityMethod::Asymptotic,
        )
    };

    Ok(HomogeneityResult {
        statistic,
        degrees_of_freedom,
        p_value,
        method,
        words_tested: kept.len(),
        significant: options.significance.is_significant(p_value),
    })
}

fn expected_counts(row_sums: &[u64], col_sums: &[u64], total: u64) -> Vec<Vec<f64>> {
    let total = total as f64;
    row_sums
        .iter()
        .map(|r| {
            col_sums
                .iter()
                .map(|c| *r as f64 * *c as f64 / total)
                .collect()
        })
        .collect()
}

fn pearson(observed: &[Vec<u64>], expected: &[Vec<f64>]) -> f64 {
    observed
        .iter()
        .zip(expected)
        .flat_map(|(o_row, e_row)| o_row.iter().zip(e_row))
        .map(|(o, e)| {
            let diff = *o as f64 - e;
            diff * diff / e
        })
        .sum()
}

/// Fixed-margin simulation. Each resample deals every word's tokens to the
/// documents without replacement from the pool of row totals, which gives
/// the same tables as shuffling the row label of every token.
fn simulate_p_value(
    row_sums: &[u64],
    col_sums: &[u64],
    expected: &[Vec<f64>],
    observed_statistic: f64,
    options: &HomogeneityOptions,
) -> Result<f64, StatsError> {
    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut simulated = vec![vec![0u64; col_sums.len()]; row_sums.len()];
    let threshold = observed_statistic * STATISTIC_SLACK;

    let mut at_least_as_extreme = 0u32;
    for _ in 0..options.resamples {
        sample_table(row_sums, col_sums, &mut rng, &mut simulated)?;
        if pearson(&simulated, expected) >= threshold {
            at_least_as_extreme += 1;
        }
    }

    Ok((1.0 + at_least_as_extreme as f64) / (options.resamples as f64 + 1.0))
}

/// Draw one table with the given margins into `table`, column by column.
/// Within a column, each row takes a hypergeometric share of what the column
/// still needs from the tokens that rows at or below it have left.
fn sample_table(
    row_sums: &[u64],
    col_sums: &[u64],
    rng: &mut StdRng,
    table: &mut [Vec<u64>],
) -> Result<(), StatsError> {
    let mut remaining = row_sums.to_vec();
    let mut pool: u64 = row_sums.iter().sum();
    let last = remaining.len() - 1;

    for (col, width) in col_sums.iter().enumerate() {
        let mut need = *width;
        let mut population = pool;
        for row in 0..last {
            let have = remaining[row];
            let drawn = if need == 0 || have == 0 {
                0
            } else if need == population {
                have
            } else if have == population {
                need
            } else {
                Hypergeometric::new(population, have, need)
                    .map_err(|err| StatsError::InvalidInput(format!("resampling: {err}")))?
                    .sample(rng)
            };
            table[row][col] = drawn;
            population -= have;
            remaining[row] -= drawn;
            need -= drawn;
        }
        table[last][col] = need;
        remaining[last] -= need;
        pool -= width;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_sparse_vectors_are_not_significant() {
        let result =
            test_homogeneity(&[5, 3, 2], &[5, 3, 2], &HomogeneityOptions::default()).unwrap();
        assert!(matches!(result.method, HomogeneityMethod::MonteCarlo { .. }));
        assert_eq!(result.statistic, 0.0);
        assert_eq!(result.p_value, 1.0);
        assert!(!result.significant);
    }

    #[test]
    fn divergent_vectors_are_significant() {
        let result =
            test_homogeneity(&[100, 0, 0], &[0, 0, 100], &HomogeneityOptions::default()).unwrap();
        assert_eq!(result.words_tested, 2);
        assert_eq!(result.method, HomogeneityMethod::Asymptotic);
        assert_eq!(result.degrees_of_freedom, Some(1));
        assert!((result.statistic - 200.0).abs() < 1e-9);
        assert!(result.p_value < 0.05);
        assert!(result.significant);
    }

    #[test]
    fn asymptotic_matches_known_statistic() {
        // 2x3 table, all expected counts >= 5.
        let rows = vec![vec![30, 20, 10], vec![20, 20, 20]];
        let result = homogeneity(&rows, &HomogeneityOptions::default()).unwrap();
        assert_eq!(result.method, HomogeneityMethod::Asymptotic);
        assert_eq!(result.degrees_of_freedom, Some(2));
        // Expected: [25,20,15] per row.
        let expected_stat = 2.0 * (25.0 / 25.0 + 0.0 + 25.0 / 15.0);
        assert!((result.statistic - expected_stat).abs() < 1e-9);
        assert!((result.p_value - (-expected_stat / 2.0).exp()).abs() < 1e-9);
    }

    #[test]
    fn sparse_divergent_table_is_significant_by_simulation() {
        let options = HomogeneityOptions::default();
        let result = test_homogeneity(&[12, 0, 0, 1], &[0, 1, 12, 0], &options).unwrap();
        assert!(matches!(result.method, HomogeneityMethod::MonteCarlo { resamples: 2000 }));
        assert_eq!(result.degrees_of_freedom, None);
        assert!(result.p_value < 0.05);
        assert!(result.p_value >= 1.0 / 2001.0);
    }

    #[test]
    fn sampled_tables_keep_both_margins() {
        let row_sums = [7, 0, 12, 5];
        let col_sums = [3, 9, 0, 1, 11];
        let mut rng = StdRng::seed_from_u64(7);
        let mut table = vec![vec![0u64; col_sums.len()]; row_sums.len()];
        for _ in 0..200 {
            sample_table(&row_sums, &col_sums, &mut rng, &mut table).unwrap();
            for (row, sum) in table.iter().zip(row_sums) {
                assert_eq!(row.iter().sum::<u64>(), sum);
            }
            for (col, sum) in col_sums.iter().enumerate() {
                assert_eq!(table.iter().map(|row| row[col]).sum::<u64>(), *sum);
            }
        }
    }

    #[test]
    fn sampled_cell_has_hypergeometric_mean() {
        // 2x2 margins [40, 60] x [50, 50]: the top-left cell averages 20.
        let mut rng = StdRng::seed_from_u64(11);
        let mut table = vec![vec![0u64; 2]; 2];
        let draws = 4000;
        let mut total = 0u64;
        for _ in 0..draws {
            sample_table(&[40, 60], &[50, 50], &mut rng, &mut table).unwrap();
            total += table[0][0];
        }
        let mean = total as f64 / draws as f64;
        assert!((mean - 20.0).abs() < 0.3, "{mean}");
    }

    #[test]
    fn simulation_cost_does_not_grow_with_token_count() {
        // Millions of tokens in two cells plus a sparse tail.
        let options = HomogeneityOptions::default();
        let result = test_homogeneity(
            &[2_000_000, 1, 0, 2, 0],
            &[0, 1, 3_000_000, 0, 3],
            &options,
        )
        .unwrap();
        assert!(matches!(result.method, HomogeneityMethod::MonteCarlo { .. }));
        assert_eq!(result.p_value, 1.0 / 2001.0);
        assert!(result.significant);
    }

    #[test]
    fn large_non_sparse_table_uses_the_asymptotic_tail() {
        // Columns alternate [10, 6] and [6, 10]: each contributes exactly 1
        // to the statistic, so X2 = k against df = k - 1.
        let k = 200_000;
        let a: Vec<u64> = (0..k).map(|i| if i % 2 == 0 { 10 } else { 6 }).collect();
        let b: Vec<u64> = (0..k).map(|i| if i % 2 == 0 { 6 } else { 10 }).collect();
        let result = test_homogeneity(&a, &b, &HomogeneityOptions::default()).unwrap();
        assert_eq!(result.method, HomogeneityMethod::Asymptotic);
        assert_eq!(result.degrees_of_freedom, Some(k as u32 - 1));
        assert!((result.statistic - k as f64).abs() < 1e-6 * k as f64);
        assert!(result.p_value > 0.45 && result.p_value < 0.55, "{}", result.p_value);
        assert!(!result.significant);
    }

    #[test]
    fn simulation_is_reproducible_for_a_seed() {
        let options = HomogeneityOptions::default();
        let a = test_homogeneity(&[4, 2, 1, 0], &[1, 2, 3, 2], &options).unwrap();
        let b = test_homogeneity(&[4, 2, 1, 0], &[1, 2, 3, 2], &options).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn too_few_columns_is_insufficient() {
        let err = test_homogeneity(&[3, 0], &[4, 0], &HomogeneityOptions::default()).unwrap_err();
        assert!(matches!(err, StatsError::InsufficientData(_)));
        let err = test_homogeneity(&[0, 0], &[0, 0], &HomogeneityOptions::default()).unwrap_err();
        assert!(matches!(err, StatsError::InsufficientData(_)));
    }

    #[test]
    fn zero_row_is_insufficient() {
        let err =
            test_homogeneity(&[0, 0, 0], &[1, 2, 3], &HomogeneityOptions::default()).unwrap_err();
        assert!(matches!(err, StatsError::InsufficientData(_)));
    }

    #[test]
    fn mismatched_lengths_are_invalid() {
        let err = test_homogeneity(&[1, 2], &[1, 2, 3], &HomogeneityOptions::default()).unwrap_err();
        assert!(matches!(err, StatsError::InvalidInput(_)));
    }

    #[test]
    fn single_document_is_insufficient() {
        let err = homogeneity(&[vec![1, 2, 3]], &HomogeneityOptions::default()).unwrap_err();
        assert!(matches!(err, StatsError::InsufficientData(_)));
    }
}
