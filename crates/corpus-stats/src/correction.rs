//! Multiple-comparison adjustments. Never applied automatically; callers opt
//! in after looking at the raw ranking.

use std::fmt;

/// A multiple-comparison adjustment a caller can ask for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Adjustment {
    Bonferroni,
    BenjaminiHochberg,
}

impl Adjustment {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "bonferroni" => Some(Adjustment::Bonferroni),
            "bh" | "fdr" | "benjamini-hochberg" => Some(Adjustment::BenjaminiHochberg),
            _ => None,
        }
    }

    /// Adjusted p-values, in input order, treating the slice as one family.
    pub fn apply(self, p_values: &[f64]) -> Vec<f64> {
        match self {
            Adjustment::Bonferroni => p_values
                .iter()
                .map(|p| bonferroni(*p, p_values.len()))
                .collect(),
            Adjustment::BenjaminiHochberg => benjamini_hochberg(p_values),
        }
    }
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Adjustment::Bonferroni => f.write_str("bonferroni"),
            Adjustment::BenjaminiHochberg => f.write_str("benjamini-hochberg"),
        }
    }
}

/// Bonferroni-adjusted p-value for one of `m` tests.
pub fn bonferroni(p_value: f64, m: usize) -> f64 {
    (p_value * m as f64).min(1.0)
}

/// Benjamini-Hochberg adjusted p-values, returned in input order.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len();
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|a, b| p_values[*b].total_cmp(&p_values[*a]));

    let mut adjusted = vec![0.0; m];
    let mut running_min = 1.0_f64;
    for (rank_from_top, idx) in order.iter().enumerate() {
        let rank = (m - rank_from_top) as f64;
        let candidate = p_values[*idx] * m as f64 / rank;
        running_min = running_min.min(candidate);
        adjusted[*idx] = running_min;
    }
    adjusted
}
