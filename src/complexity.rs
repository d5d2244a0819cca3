//! Input complexity estimation and timeout scheduling.
//!
//! The estimator predicts how costly an input is to scan, from length,
//! special-character density, parenthesis nesting, and regex-metacharacter
//! density. The scheduler maps that score to a wall-clock budget for the
//! matching engine. Both are pure functions; the estimator is a single
//! linear pass with no regex involvement, so it cannot itself be driven
//! into pathological behavior by the inputs it scores.

use std::time::Duration;

/// Upper bound for complexity scores.
pub const COMPLEXITY_CAP: f64 = 50.0;

/// Characters that carry regex-metacharacter cost weight.
const METACHARS: &[char] = &[
    '\\', '^', '$', '.', '|', '?', '*', '+', '(', ')', '[', ']', '{', '}',
];

/// Estimate scan complexity for `text`, clamped to `[0, COMPLEXITY_CAP]`.
pub fn estimate_complexity(text: &str) -> f64 {
    let mut total: usize = 0;
    let mut special: usize = 0;
    let mut meta: usize = 0;
    let mut nested: usize = 0;
    let mut depth: u32 = 0;

    for c in text.chars() {
        total += 1;
        if !c.is_ascii_alphanumeric() && !c.is_whitespace() {
            special += 1;
        }
        if METACHARS.contains(&c) {
            meta += 1;
        }
        match c {
            '(' => {
                if depth >= 1 {
                    nested += 1;
                }
                depth = depth.saturating_add(1);
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    if total == 0 {
        return 0.0;
    }

    let len = total as f64;
    let length_term = (len / 400.0).min(15.0);
    let special_term = (special as f64 / len) * 15.0;
    let nesting_term = nested.min(10) as f64;
    let meta_term = (meta as f64 / len) * 10.0;

    (length_term + special_term + nesting_term + meta_term).clamp(0.0, COMPLEXITY_CAP)
}

/// Budget scheduling parameters.
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    /// Minimum budget granted to any scan.
    pub floor: Duration,
    /// Maximum budget regardless of complexity.
    pub ceiling: Duration,
    /// Extra milliseconds granted per complexity point.
    pub slope_ms: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            floor: Duration::from_millis(50),
            ceiling: Duration::from_millis(500),
            slope_ms: 9.0,
        }
    }
}

/// Map a complexity score to a scan budget.
///
/// Affine in `complexity`, clamped to `[floor, ceiling]`. Monotone
/// non-decreasing for any fixed configuration.
pub fn schedule_budget(complexity: f64, config: &BudgetConfig) -> Duration {
    let floor_ms = config.floor.as_secs_f64() * 1000.0;
    let ceiling_ms = config.ceiling.as_secs_f64() * 1000.0;
    let raw_ms = floor_ms + complexity.max(0.0) * config.slope_ms;
    let ms = raw_ms.max(floor_ms).min(ceiling_ms);
    Duration::from_secs_f64(ms / 1000.0)
}
