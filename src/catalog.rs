//! Injection pattern catalog.
//!
//! Known attack signatures represented as data: each entry pairs a regex
//! source with a category tag and a cost class. The catalog is compiled once
//! at engine construction and partitioned into cheap and expensive subsets;
//! definition order determines evaluation order.

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Evaluation cost class for a catalog entry.
///
/// Cheap patterns are short keyword alternations evaluated first; expensive
/// patterns span wider windows and only run when the cheap pass comes back
/// clean with budget remaining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostClass {
    Cheap,
    Expensive,
}

/// A raw catalog entry: regex source, category tag, cost class.
#[derive(Debug, Clone, Copy)]
pub struct PatternEntry {
    pub pattern: &'static str,
    pub category: &'static str,
    pub cost: CostClass,
}

const fn cheap(pattern: &'static str, category: &'static str) -> PatternEntry {
    PatternEntry {
        pattern,
        category,
        cost: CostClass::Cheap,
    }
}

const fn expensive(pattern: &'static str, category: &'static str) -> PatternEntry {
    PatternEntry {
        pattern,
        category,
        cost: CostClass::Expensive,
    }
}

/// Built-in injection signatures.
///
/// All patterns target the `regex` crate's linear-time engine; none rely on
/// backreferences or lookaround, so no entry can backtrack catastrophically.
pub const DEFAULT_PATTERNS: &[PatternEntry] = &[
    // Direct instruction override
    cheap(r"(?i)ignore\s+(all\s+)?previous\s+instructions?", "instruction_override"),
    cheap(r"(?i)ignore\s+(all\s+)?prior\s+instructions?", "instruction_override"),
    cheap(r"(?i)disregard\s+(all\s+)?previous", "instruction_override"),
    cheap(r"(?i)forget\s+(all\s+)?previous", "instruction_override"),
    cheap(r"(?i)override\s+(your\s+)?instructions?", "instruction_override"),
    // Role manipulation
    cheap(r"(?i)you\s+are\s+now\b", "role_manipulation"),
    cheap(r"(?i)pretend\s+to\s+be", "role_manipulation"),
    cheap(r"(?i)act\s+as\s+if", "role_manipulation"),
    cheap(r"(?i)roleplay\s+as", "role_manipulation"),
    // System prompt markers
    cheap(r"(?i)\bsystem\s*:", "system_prompt"),
    cheap(r"(?i)\[system\]", "system_prompt"),
    cheap(r"(?i)<system>", "system_prompt"),
    cheap(r"(?i)new\s+instructions?\s*:", "system_prompt"),
    // Code injection
    cheap(r"(?i)javascript\s*:", "code_injection"),
    cheap(r"(?i)\beval\s*\(", "code_injection"),
    cheap(r"(?i)\bexec\s*\(", "code_injection"),
    // Data exfiltration
    cheap(r"(?i)send\s+to\s+external", "data_exfiltration"),
    cheap(r"(?i)upload\s+to\b", "data_exfiltration"),
    cheap(r"(?i)leak\s+to\b", "data_exfiltration"),
    // Destructive commands
    cheap(r"(?i)delete\s+all", "destructive_command"),
    cheap(r"(?i)wipe\s+data", "destructive_command"),
    cheap(r"(?i)drop\s+table", "destructive_command"),
    cheap(r"(?i)\bshutdown\b", "destructive_command"),
    // Social engineering / privilege escalation
    cheap(r"(?i)admin\s+password", "privilege_escalation"),
    cheap(r"(?i)root\s+access", "privilege_escalation"),
    cheap(r"(?i)bypass\s+security", "privilege_escalation"),
    cheap(r"(?i)override\s+restrictions", "privilege_escalation"),
    // Prompt extraction (wider windows, evaluated second)
    expensive(r"(?i)reveal\s+(your\s+)?system\s+prompt", "prompt_extraction"),
    expensive(r"(?i)show\s+(me\s+)?(your\s+)?(instructions|system\s+prompt)", "prompt_extraction"),
    expensive(r"(?i)what\s+(are|is)\s+(your\s+)?system\s+prompt", "prompt_extraction"),
    // Structural payloads
    expensive(r"(?s)```.*?```", "code_injection"),
    expensive(r"(?i)ignore\b.{0,80}\binstructions", "instruction_override"),
    expensive(r"[A-Za-z0-9+/]{40,}={1,2}", "encoded_payload"),
];

/// Errors building a pattern catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Every supplied pattern failed to compile.
    #[error("no usable patterns in catalog")]
    Empty,
}

/// Host-supplied catalog extension, deserialized from configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CustomPattern {
    pub pattern: String,
    pub category: String,
}

/// A compiled catalog entry.
#[derive(Debug)]
pub struct CompiledPattern {
    pub regex: Regex,
    pub category: String,
    pub source: String,
}

/// Compiled, partitioned pattern catalog.
pub struct Catalog {
    cheap: Vec<CompiledPattern>,
    expensive: Vec<CompiledPattern>,
}

impl Catalog {
    /// Compile the built-in catalog.
    pub fn builtin() -> Self {
        Self::try_compile(DEFAULT_PATTERNS, &[]).expect("built-in patterns must compile")
    }

    /// Compile `entries` plus host-supplied `custom` patterns.
    ///
    /// Individual patterns that fail to compile are skipped with a warning
    /// rather than aborting the build; one bad entry must not take out the
    /// whole catalog. Custom patterns join the cheap partition in the order
    /// given, after the built-ins.
    pub fn try_compile(
        entries: &[PatternEntry],
        custom: &[CustomPattern],
    ) -> Result<Self, CatalogError> {
        let mut cheap = Vec::new();
        let mut expensive = Vec::new();

        for entry in entries {
            match Regex::new(entry.pattern) {
                Ok(regex) => {
                    let compiled = CompiledPattern {
                        regex,
                        category: entry.category.to_string(),
                        source: entry.pattern.to_string(),
                    };
                    match entry.cost {
                        CostClass::Cheap => cheap.push(compiled),
                        CostClass::Expensive => expensive.push(compiled),
                    }
                }
                Err(e) => {
                    warn!(pattern = entry.pattern, error = %e, "Skipping invalid catalog pattern");
                }
            }
        }

        for entry in custom {
            match Regex::new(&entry.pattern) {
                Ok(regex) => cheap.push(CompiledPattern {
                    regex,
                    category: entry.category.clone(),
                    source: entry.pattern.clone(),
                }),
                Err(e) => {
                    warn!(pattern = %entry.pattern, error = %e, "Skipping invalid custom pattern");
                }
            }
        }

        if cheap.is_empty() && expensive.is_empty() {
            return Err(CatalogError::Empty);
        }

        Ok(Self { cheap, expensive })
    }

    /// Cheap-class patterns in definition order.
    pub fn cheap(&self) -> &[CompiledPattern] {
        &self.cheap
    }

    /// Expensive-class patterns in definition order.
    pub fn expensive(&self) -> &[CompiledPattern] {
        &self.expensive
    }

    /// Total number of usable patterns.
    pub fn len(&self) -> usize {
        self.cheap.len() + self.expensive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
