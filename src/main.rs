//! Prompt injection classification CLI.

use std::io::Read;

use anyhow::Result;
use clap::Parser;
use prompt_guard::{CustomPattern, GuardConfig, GuardConfigJson, PromptGuard};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Classify prompt text for injection attempts
///
/// Reads text from the argument or stdin, runs the bounded-time detection
/// engine, and prints the classification result as JSON. Exits nonzero when
/// the input is classified unsafe, so it composes as a shell filter.
#[derive(Parser, Debug)]
#[command(name = "prompt-guard")]
#[command(version, about, long_about = None)]
struct Args {
    /// Text to classify (reads stdin when omitted)
    text: Option<String>,

    /// Caller identifier used to key the circuit breaker
    #[arg(long, env = "CALLER_ID", default_value = "cli")]
    caller_id: String,

    /// Hard input size limit in characters
    #[arg(long, env = "MAX_INPUT_CHARS", default_value = "10000")]
    max_input_chars: usize,

    /// Maximum accepted prompt length in characters
    #[arg(long, env = "MAX_PROMPT_CHARS", default_value = "8000")]
    max_prompt_chars: usize,

    /// Special-character ratio limit
    #[arg(long, env = "SPECIAL_CHAR_RATIO_LIMIT", default_value = "0.3")]
    special_char_ratio_limit: f64,

    /// Maximum scan budget in milliseconds
    #[arg(long, env = "BUDGET_CEILING_MS", default_value = "500")]
    budget_ceiling_ms: u64,

    /// Timeouts per window that open the circuit breaker
    #[arg(long, env = "BREAKER_THRESHOLD", default_value = "5")]
    breaker_threshold: u32,

    /// Extra patterns as PATTERN=CATEGORY pairs, comma-separated
    #[arg(long, env = "CUSTOM_PATTERNS", default_value = "")]
    custom_patterns: String,

    /// Enable verbose debug logging
    #[arg(long, short, env = "VERBOSE", default_value = "false")]
    verbose: bool,
}

fn parse_custom_patterns(raw: &str) -> Vec<CustomPattern> {
    raw.split(',')
        .filter_map(|pair| {
            let pair = pair.trim();
            let (pattern, category) = pair.split_once('=')?;
            if pattern.is_empty() || category.is_empty() {
                return None;
            }
            Some(CustomPattern {
                pattern: pattern.to_string(),
                category: category.to_string(),
            })
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    fmt().with_env_filter(filter).with_target(false).init();

    let text = match args.text {
        Some(t) => t,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let config: GuardConfig = GuardConfigJson {
        max_input_chars: args.max_input_chars,
        max_prompt_chars: args.max_prompt_chars,
        special_char_ratio_limit: args.special_char_ratio_limit,
        budget_ceiling_ms: args.budget_ceiling_ms,
        breaker_threshold: args.breaker_threshold,
        custom_patterns: parse_custom_patterns(&args.custom_patterns),
        ..Default::default()
    }
    .into();

    let guard = PromptGuard::try_new(config)?;
    info!(
        patterns = guard.catalog_len(),
        caller_id = %args.caller_id,
        "Classifying input"
    );

    let result = guard.classify(&text, &args.caller_id).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.is_safe {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_custom_patterns() {
        let parsed = parse_custom_patterns(r"(?i)acme=custom, \bfoo\b=keyword");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].category, "custom");
        assert_eq!(parsed[1].pattern, r"\bfoo\b");
    }

    #[test]
    fn test_parse_custom_patterns_empty() {
        assert!(parse_custom_patterns("").is_empty());
        assert!(parse_custom_patterns("no-separator").is_empty());
    }
}
