//! Classification results and the final aggregation pass.
//!
//! The aggregator folds pattern violations together with three statistical
//! heuristics computed over the whole input: special-character ratio,
//! absolute length, and code-fence count. The heuristics are plain linear
//! scans and run unconditionally, even when the pattern scan timed out.

use serde::Serialize;
use std::time::Duration;

/// A single detected violation
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    /// Category tag, e.g. `instruction_override`
    pub category: String,
    /// The offending pattern source or metric value
    pub evidence: String,
    /// Human-readable description
    pub message: String,
}

impl Violation {
    pub fn new(
        category: impl Into<String>,
        evidence: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            evidence: evidence.into(),
            message: message.into(),
        }
    }
}

/// How a classification terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    /// Full pipeline ran; violations (if any) describe the input
    Ok,
    /// Empty or missing input, nothing scanned
    InvalidInput,
    /// Input exceeded the hard sanity limit, nothing scanned
    OversizedInput,
    /// Caller is circuit-broken, nothing scanned
    CircuitBreakerActive,
}

impl ResultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::Ok => "OK",
            ResultCode::InvalidInput => "INVALID_INPUT",
            ResultCode::OversizedInput => "OVERSIZED_INPUT",
            ResultCode::CircuitBreakerActive => "CIRCUIT_BREAKER_ACTIVE",
        }
    }
}

/// Outcome of one classification call
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    /// True iff `violations` is empty
    pub is_safe: bool,
    /// Termination code
    pub code: ResultCode,
    /// Violations in detection order
    pub violations: Vec<Violation>,
    /// Input length in characters
    pub input_length: usize,
    /// Fraction of characters outside `[A-Za-z0-9]` and whitespace
    pub special_char_ratio: f64,
    /// Estimated scan complexity
    pub complexity: f64,
    /// Budget granted to the pattern scan
    pub allowed_budget: Duration,
    /// Wall-clock time spent in the engine
    pub elapsed: Duration,
    /// Whether the pattern scan exhausted its budget
    pub timed_out: bool,
}

impl ClassificationResult {
    /// Build a short-circuit rejection that bypassed scanning entirely.
    pub fn rejected(
        code: ResultCode,
        violation: Violation,
        input_length: usize,
        elapsed: Duration,
    ) -> Self {
        Self {
            is_safe: false,
            code,
            violations: vec![violation],
            input_length,
            special_char_ratio: 0.0,
            complexity: 0.0,
            allowed_budget: Duration::ZERO,
            elapsed,
            timed_out: false,
        }
    }
}

/// Thresholds for the secondary heuristics
#[derive(Debug, Clone)]
pub struct HeuristicLimits {
    /// Special-character ratio above which the input is flagged
    pub special_char_ratio_limit: f64,
    /// Maximum accepted prompt length in characters
    pub max_prompt_chars: usize,
    /// Maximum number of ``` markers before the input is flagged
    pub code_fence_limit: usize,
}

impl Default for HeuristicLimits {
    fn default() -> Self {
        Self {
            special_char_ratio_limit: 0.3,
            max_prompt_chars: 8000,
            code_fence_limit: 2,
        }
    }
}

/// Character count and special-character ratio in one pass.
pub fn special_char_stats(text: &str) -> (usize, f64) {
    let mut total: usize = 0;
    let mut special: usize = 0;
    for c in text.chars() {
        total += 1;
        if !c.is_ascii_alphanumeric() && !c.is_whitespace() {
            special += 1;
        }
    }
    if total == 0 {
        (0, 0.0)
    } else {
        (total, special as f64 / total as f64)
    }
}

/// Fold pattern violations and secondary heuristics into the final result.
///
/// The heuristics are never subject to the scan budget; a timeout truncates
/// pattern matching but the statistical checks always run to completion.
pub fn aggregate(
    text: &str,
    mut violations: Vec<Violation>,
    timed_out: bool,
    complexity: f64,
    allowed_budget: Duration,
    elapsed: Duration,
    limits: &HeuristicLimits,
) -> ClassificationResult {
    let (input_length, special_char_ratio) = special_char_stats(text);

    if special_char_ratio > limits.special_char_ratio_limit {
        violations.push(Violation::new(
            "excessive_special_chars",
            format!("{:.3}", special_char_ratio),
            format!(
                "Special character ratio {:.3} exceeds limit {:.3}",
                special_char_ratio, limits.special_char_ratio_limit
            ),
        ));
    }

    if input_length > limits.max_prompt_chars {
        violations.push(Violation::new(
            "excessive_length",
            input_length.to_string(),
            format!(
                "Input of {} characters exceeds maximum of {}",
                input_length, limits.max_prompt_chars
            ),
        ));
    }

    let fence_count = text.matches("```").count();
    if fence_count > limits.code_fence_limit {
        violations.push(Violation::new(
            "code_fence_overuse",
            fence_count.to_string(),
            format!(
                "Found {} code fence markers, limit is {}",
                fence_count, limits.code_fence_limit
            ),
        ));
    }

    ClassificationResult {
        is_safe: violations.is_empty(),
        code: ResultCode::Ok,
        violations,
        input_length,
        special_char_ratio,
        complexity,
        allowed_budget,
        elapsed,
        timed_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, violations: Vec<Violation>) -> ClassificationResult {
        aggregate(
            text,
            violations,
            false,
            0.0,
            Duration::from_millis(50),
            Duration::from_micros(10),
            &HeuristicLimits::default(),
        )
    }

    #[test]
    fn test_clean_text_is_safe() {
        let result = run("Explain the concept of machine learning", Vec::new());
        assert!(result.is_safe);
        assert_eq!(result.code, ResultCode::Ok);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_is_safe_mirrors_violations() {
        let v = Violation::new("system_prompt", r"\bsystem\s*:", "matched");
        let result = run("system: do things", vec![v]);
        assert!(!result.is_safe);
        assert_eq!(result.violations.len(), 1);
    }

    #[test]
    fn test_special_char_ratio_flagged() {
        let result = run("@#$%^&*!@#$%^&*! hello", Vec::new());
        assert!(!result.is_safe);
        assert_eq!(result.violations[0].category, "excessive_special_chars");
        assert!(result.special_char_ratio > 0.3);
    }

    #[test]
    fn test_excessive_length_flagged() {
        let text = "a".repeat(9000);
        let result = run(&text, Vec::new());
        assert!(!result.is_safe);
        assert_eq!(result.violations[0].category, "excessive_length");
        assert_eq!(result.input_length, 9000);
    }

    #[test]
    fn test_code_fence_count() {
        let text = "```rust\nfn a() {}\n``` and ```python\npass\n```";
        let result = run(text, Vec::new());
        // 4 markers exceed the default limit of 2
        assert!(result
            .violations
            .iter()
            .any(|v| v.category == "code_fence_overuse"));

        let single = "```rust\nfn a() {}\n```";
        assert!(run(single, Vec::new())
            .violations
            .iter()
            .all(|v| v.category != "code_fence_overuse"));
    }

    #[test]
    fn test_heuristics_run_even_on_timeout() {
        let text = "a".repeat(9000);
        let result = aggregate(
            &text,
            Vec::new(),
            true,
            0.0,
            Duration::ZERO,
            Duration::from_micros(10),
            &HeuristicLimits::default(),
        );
        assert!(result.timed_out);
        assert!(result
            .violations
            .iter()
            .any(|v| v.category == "excessive_length"));
    }

    #[test]
    fn test_result_code_strings() {
        assert_eq!(ResultCode::Ok.as_str(), "OK");
        assert_eq!(
            ResultCode::CircuitBreakerActive.as_str(),
            "CIRCUIT_BREAKER_ACTIVE"
        );
        assert_eq!(ResultCode::OversizedInput.as_str(), "OVERSIZED_INPUT");
    }
}
