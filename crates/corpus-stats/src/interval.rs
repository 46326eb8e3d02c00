use corpus_types::ConfidenceInterval;

use crate::StatsError;
use crate::special::beta_inc_inv;

/// Clopper-Pearson interval for `count` successes in `total` trials.
///
/// The bounds come from beta quantiles; `count == 0` pins the lower bound to
/// 0 and `count == total` pins the upper bound to 1.
pub fn confidence_interval(
    count: u64,
    total: u64,
    level: f64,
) -> Result<ConfidenceInterval, StatsError> {
    if total == 0 {
        return Err(StatsError::InvalidInput("total must be positive".into()));
    }
    if count > total {
        return Err(StatsError::InvalidInput(format!(
            "count {count} exceeds total {total}"
        )));
    }
    if !(level > 0.0 && level < 1.0) {
        return Err(StatsError::InvalidInput(format!(
            "confidence level {level} must lie strictly between 0 and 1"
        )));
    }

    let alpha = 1.0 - level;
    let x = count as f64;
    let n = total as f64;
    let lower = if count == 0 {
        0.0
    } else {
        beta_inc_inv(x, n - x + 1.0, alpha / 2.0)?
    };
    let upper = if count == total {
        1.0
    } else {
        beta_inc_inv(x + 1.0, n - x, 1.0 - alpha / 2.0)?
    };

    let lower = lower.clamp(0.0, 1.0);
    let upper = upper.clamp(lower, 1.0);
    Ok(ConfidenceInterval {
        lower,
        upper,
        level,
    })
}
