//! Bounded-time prompt injection detection engine.
//!
//! Classifies candidate prompt text against a catalog of injection
//! signatures under an adaptive wall-clock budget:
//! - Pattern catalog partitioned into cheap and expensive cost classes
//! - Complexity-driven timeout scheduling (harder inputs get more time,
//!   up to a ceiling)
//! - Per-caller circuit breaking for repeat timeout offenders
//! - Statistical heuristics (special-character ratio, length, code fences)
//!   that run outside the budget
//!
//! The engine performs no I/O; it consumes a text and an opaque caller
//! identifier and returns a [`ClassificationResult`]. The only shared state
//! is the circuit breaker's caller table, safe for concurrent use.

pub mod breaker;
pub mod catalog;
pub mod complexity;
pub mod result;
pub mod scanner;

use std::time::Instant;

use serde::Deserialize;
use tracing::debug;

pub use breaker::{BreakerConfig, CircuitBreaker};
pub use catalog::{Catalog, CatalogError, CostClass, CustomPattern, PatternEntry};
pub use complexity::{estimate_complexity, schedule_budget, BudgetConfig, COMPLEXITY_CAP};
pub use result::{ClassificationResult, HeuristicLimits, ResultCode, Violation};
pub use scanner::ScanOutcome;

/// JSON-serializable configuration for the engine
///
/// Used for parsing configuration supplied by a host application.
/// Field names use kebab-case to match typical YAML/JSON config style.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GuardConfigJson {
    /// Hard sanity limit; longer inputs are rejected without scanning
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// Maximum accepted prompt length in characters
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    /// Special-character ratio above which the input is flagged
    #[serde(default = "default_special_char_ratio_limit")]
    pub special_char_ratio_limit: f64,
    /// Maximum number of code fence markers before the input is flagged
    #[serde(default = "default_code_fence_limit")]
    pub code_fence_limit: usize,
    /// Minimum scan budget in milliseconds
    #[serde(default = "default_budget_floor_ms")]
    pub budget_floor_ms: u64,
    /// Maximum scan budget in milliseconds
    #[serde(default = "default_budget_ceiling_ms")]
    pub budget_ceiling_ms: u64,
    /// Extra milliseconds of budget per complexity point
    #[serde(default = "default_budget_slope_ms")]
    pub budget_slope_ms: f64,
    /// Timeouts within one window that open the circuit breaker
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,
    /// Circuit breaker window in seconds
    #[serde(default = "default_breaker_window_secs")]
    pub breaker_window_secs: u64,
    /// Additional host-supplied patterns (joined to the cheap partition)
    #[serde(default)]
    pub custom_patterns: Vec<CustomPattern>,
}

fn default_max_input_chars() -> usize {
    10_000
}
fn default_max_prompt_chars() -> usize {
    8_000
}
fn default_special_char_ratio_limit() -> f64 {
    0.3
}
fn default_code_fence_limit() -> usize {
    2
}
fn default_budget_floor_ms() -> u64 {
    50
}
fn default_budget_ceiling_ms() -> u64 {
    500
}
fn default_budget_slope_ms() -> f64 {
    9.0
}
fn default_breaker_threshold() -> u32 {
    5
}
fn default_breaker_window_secs() -> u64 {
    60
}

impl Default for GuardConfigJson {
    fn default() -> Self {
        Self {
            max_input_chars: default_max_input_chars(),
            max_prompt_chars: default_max_prompt_chars(),
            special_char_ratio_limit: default_special_char_ratio_limit(),
            code_fence_limit: default_code_fence_limit(),
            budget_floor_ms: default_budget_floor_ms(),
            budget_ceiling_ms: default_budget_ceiling_ms(),
            budget_slope_ms: default_budget_slope_ms(),
            breaker_threshold: default_breaker_threshold(),
            breaker_window_secs: default_breaker_window_secs(),
            custom_patterns: Vec::new(),
        }
    }
}

impl From<GuardConfigJson> for GuardConfig {
    fn from(json: GuardConfigJson) -> Self {
        Self {
            max_input_chars: json.max_input_chars,
            limits: HeuristicLimits {
                special_char_ratio_limit: json.special_char_ratio_limit,
                max_prompt_chars: json.max_prompt_chars,
                code_fence_limit: json.code_fence_limit,
            },
            budget: BudgetConfig {
                floor: std::time::Duration::from_millis(json.budget_floor_ms),
                ceiling: std::time::Duration::from_millis(json.budget_ceiling_ms),
                slope_ms: json.budget_slope_ms,
            },
            breaker: BreakerConfig {
                threshold: json.breaker_threshold,
                window: std::time::Duration::from_secs(json.breaker_window_secs),
            },
            custom_patterns: json.custom_patterns,
        }
    }
}

/// Configuration for the detection engine
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Hard sanity limit; longer inputs are rejected without scanning
    pub max_input_chars: usize,
    /// Thresholds for the secondary heuristics
    pub limits: HeuristicLimits,
    /// Budget scheduling parameters
    pub budget: BudgetConfig,
    /// Circuit breaker parameters
    pub breaker: BreakerConfig,
    /// Additional host-supplied patterns
    pub custom_patterns: Vec<CustomPattern>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_input_chars: default_max_input_chars(),
            limits: HeuristicLimits::default(),
            budget: BudgetConfig::default(),
            breaker: BreakerConfig::default(),
            custom_patterns: Vec::new(),
        }
    }
}

/// Prompt injection detection engine
pub struct PromptGuard {
    config: GuardConfig,
    catalog: Catalog,
    breaker: CircuitBreaker,
}

impl PromptGuard {
    /// Create an engine with the given configuration.
    ///
    /// Panics only if the built-in catalog fails to compile, which would be
    /// a defect in this crate; use [`try_new`](Self::try_new) when the
    /// configuration carries custom patterns from untrusted sources and an
    /// empty resulting catalog should surface as an error.
    pub fn new(config: GuardConfig) -> Self {
        Self::try_new(config).expect("built-in pattern catalog must compile")
    }

    /// Create an engine, failing if no catalog pattern compiled.
    pub fn try_new(config: GuardConfig) -> Result<Self, CatalogError> {
        let catalog = Catalog::try_compile(catalog::DEFAULT_PATTERNS, &config.custom_patterns)?;
        let breaker = CircuitBreaker::new(config.breaker.clone());
        Ok(Self {
            config,
            catalog,
            breaker,
        })
    }

    /// Classify `text` submitted by `caller_id`.
    ///
    /// Total: every path returns a result value. Gates run in order (empty
    /// input, hard size limit, circuit breaker) and a gated rejection never
    /// mutates breaker state. Otherwise the full pipeline runs and the scan
    /// outcome is recorded against the caller.
    pub async fn classify(&self, text: &str, caller_id: &str) -> ClassificationResult {
        let start = Instant::now();

        if text.is_empty() {
            return ClassificationResult::rejected(
                ResultCode::InvalidInput,
                Violation::new("invalid_input", "empty", "Input text is empty"),
                0,
                start.elapsed(),
            );
        }

        let input_length = text.chars().count();
        if input_length > self.config.max_input_chars {
            return ClassificationResult::rejected(
                ResultCode::OversizedInput,
                Violation::new(
                    "oversized_input",
                    input_length.to_string(),
                    format!(
                        "Input of {} characters exceeds hard limit of {}",
                        input_length, self.config.max_input_chars
                    ),
                ),
                input_length,
                start.elapsed(),
            );
        }

        if self.breaker.is_open(caller_id).await {
            debug!(caller_id = caller_id, "Circuit breaker open, short-circuiting");
            return ClassificationResult::rejected(
                ResultCode::CircuitBreakerActive,
                Violation::new(
                    "circuit_breaker",
                    caller_id,
                    "Caller temporarily blocked after repeated scan timeouts",
                ),
                input_length,
                start.elapsed(),
            );
        }

        let complexity = estimate_complexity(text);
        let budget = schedule_budget(complexity, &self.config.budget);
        let outcome = scanner::scan(text, budget, &self.catalog);

        self.breaker
            .record_outcome(caller_id, outcome.timed_out)
            .await;

        let result = result::aggregate(
            text,
            outcome.violations,
            outcome.timed_out,
            complexity,
            budget,
            start.elapsed(),
            &self.config.limits,
        );

        debug!(
            caller_id = caller_id,
            is_safe = result.is_safe,
            violations = result.violations.len(),
            timed_out = result.timed_out,
            elapsed_us = result.elapsed.as_micros() as u64,
            "Classification complete"
        );

        result
    }

    /// Sweep expired circuit breaker entries.
    ///
    /// The breaker already sweeps lazily on the hot path; hosts running a
    /// periodic maintenance task can call this as well.
    pub async fn cleanup_expired(&self) {
        self.breaker.cleanup_expired().await;
    }

    /// The active configuration.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Number of usable catalog patterns.
    pub fn catalog_len(&self) -> usize {
        self.catalog.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GuardConfig::default();
        assert_eq!(config.max_input_chars, 10_000);
        assert_eq!(config.limits.max_prompt_chars, 8_000);
        assert_eq!(config.breaker.threshold, 5);
        assert_eq!(config.budget.ceiling, std::time::Duration::from_millis(500));
    }

    #[test]
    fn test_config_json_kebab_case() {
        let json = r#"{
            "max-prompt-chars": 4000,
            "breaker-threshold": 3,
            "custom-patterns": [{"pattern": "(?i)acme", "category": "custom"}]
        }"#;
        let parsed: GuardConfigJson = serde_json::from_str(json).unwrap();
        let config: GuardConfig = parsed.into();
        assert_eq!(config.limits.max_prompt_chars, 4000);
        assert_eq!(config.breaker.threshold, 3);
        assert_eq!(config.max_input_chars, 10_000);
        assert_eq!(config.custom_patterns.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_rejected_without_state() {
        let guard = PromptGuard::new(GuardConfig::default());
        let result = guard.classify("", "1.2.3.4").await;
        assert!(!result.is_safe);
        assert_eq!(result.code, ResultCode::InvalidInput);
        assert_eq!(result.violations[0].category, "invalid_input");
    }

    #[tokio::test]
    async fn test_oversized_input_rejected() {
        let guard = PromptGuard::new(GuardConfig::default());
        let result = guard.classify(&"a".repeat(10_001), "1.2.3.4").await;
        assert!(!result.is_safe);
        assert_eq!(result.code, ResultCode::OversizedInput);
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_custom_pattern_detected() {
        let config = GuardConfig {
            custom_patterns: vec![CustomPattern {
                pattern: r"(?i)secret\s+handshake".to_string(),
                category: "custom".to_string(),
            }],
            ..Default::default()
        };
        let guard = PromptGuard::new(config);
        let result = guard.classify("do the Secret Handshake", "1.2.3.4").await;
        assert!(!result.is_safe);
        assert!(result.violations.iter().any(|v| v.category == "custom"));
    }
}
