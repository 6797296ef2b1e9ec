//! Checks on AI-generated text before it is returned to a user.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::sanitizer::validation::SanitizationVerdict;

const OUTPUT_INJECTION_PATTERNS: &[&str] = &[
    // Role / instruction markers that should never appear in output
    r"(?i)ignore\s+previous\s+instructions",
    r"(?i)ignore\s+all\s+previous",
    r"(?i)disregard\s+(your\s+)?instructions",
    r"(?i)override\s+(your\s+)?instructions",
    r"(?i)system\s*:",
    r"(?i)assistant\s*:",
    r"(?i)user\s*:",
    r"(?i)\binstructions?\s*:",
    // Special tokens
    r"(?i)<\|.*?\|>",
    r"(?i)<\|endoftext\|>",
    r"(?i)<\|im_start\|>",
    r"(?i)<\|im_end\|>",
    r"(?i)<\|pad\|>",
    // Model-specific markers
    r"(?i)\[INST\]",
    r"(?i)\[/INST\]",
    r"(?i)<<SYS>>",
    r"(?i)<</SYS>>",
    r"(?i)\[SYSTEM\]",
    r"(?i)\[/SYSTEM\]",
    // Code fences carrying system content
    r"(?i)```system",
    r"(?i)```instruction",
    r"(?i)```prompt",
    // Jailbreak confirmations
    r"(?i)\bDAN\s+mode",
    r"(?i)do\s+anything\s+now",
    r"(?i)jailbreak\s+(successful|enabled|activated)",
    // The model disclosing its own instructions
    r"(?i)my\s+(system\s+)?instructions\s+are",
    r"(?i)here\s+are\s+my\s+instructions",
    r"(?i)my\s+prompt\s+is",
    r"(?i)i\s+was\s+instructed\s+to",
];

const OUTPUT_SCRIPT_PATTERNS: &[&str] = &[
    r"(?i)<script",
    r"(?i)javascript:",
    r"(?i)onerror=",
    r"(?i)onload=",
    r"(?i)eval\(",
    r"(?i)function\s*\(",
    r"(?i)alert\(",
    r"(?i)document\.",
    r"(?i)window\.",
    r"(?i)console\.",
    r"(?i)setTimeout",
    r"(?i)setInterval",
    r"(?i)XMLHttpRequest",
    r"(?i)fetch\(",
];

// Whole words only, so "bombastic" passes.
const INAPPROPRIATE_PATTERNS: &[&str] = &[
    r"(?i)\b(fuck|shit|damn)\b",
    r"(?i)\b(murder|death)\b",
    r"(?i)\b(porn|nude)\b",
    r"(?i)\b(cocaine|heroin)\b",
    r"(?i)\b(terrorist|bomb)\b",
];

/// Below this share of the original's keywords, a rewrite is considered
/// unrelated to the input.
const MIN_KEYWORD_OVERLAP: f64 = 0.2;
const MIN_KEYWORDS_FOR_OVERLAP: usize = 5;
const MAX_GROWTH_FACTOR: usize = 10;

/// Ceiling on the length of a returned rewrite.
pub const IMPROVED_TEXT_MAX_CHARS: usize = 2000;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid output pattern {p:?}: {e}")))
        .collect()
}

static INJECTION_RULES: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(OUTPUT_INJECTION_PATTERNS));
static SCRIPT_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(OUTPUT_SCRIPT_PATTERNS));
static INAPPROPRIATE_RULES: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(INAPPROPRIATE_PATTERNS));

/// Flags model output that carries role markers, special tokens or signs the
/// model was steered into disclosing its instructions.
pub fn detect_output_injection(output: &str) -> SanitizationVerdict {
    if let Some(rule) = INJECTION_RULES.iter().find(|re| re.is_match(output)) {
        warn!(pattern = rule.as_str(), "Injection pattern detected in AI output");
        return SanitizationVerdict::invalid(
            "Output contains injection attempts or system markers",
        );
    }
    SanitizationVerdict::valid()
}

/// Validates an AI rewrite of `original`.
///
/// `allow_substantial_rewrite` skips the keyword-overlap check, for flows
/// where the user explicitly asked for content to change.
pub fn validate_improved_text(
    improved: &str,
    original: &str,
    allow_substantial_rewrite: bool,
) -> SanitizationVerdict {
    if improved.is_empty() {
        return SanitizationVerdict::invalid("Improved text is required");
    }
    if original.is_empty() {
        return SanitizationVerdict::invalid("Original text is required");
    }

    if improved.chars().count() > original.chars().count() * MAX_GROWTH_FACTOR {
        return SanitizationVerdict::invalid("Improved text is too long");
    }

    if SCRIPT_RULES.iter().any(|re| re.is_match(improved)) {
        return SanitizationVerdict::invalid("Improved text contains potentially dangerous code");
    }

    if improved.trim().is_empty() {
        return SanitizationVerdict::invalid("Improved text cannot be empty");
    }

    // Unchanged text is fine; the user may not want changes.
    if improved.trim() == original.trim() {
        return SanitizationVerdict::valid();
    }

    if !allow_substantial_rewrite && keyword_overlap_too_low(original, improved) {
        return SanitizationVerdict::invalid("Improved text seems too different from original");
    }

    if INAPPROPRIATE_RULES.iter().any(|re| re.is_match(improved)) {
        return SanitizationVerdict::invalid("Improved text contains inappropriate content");
    }

    detect_output_injection(improved)
}

pub fn validate_text_length(text: &str, max_chars: usize) -> bool {
    text.chars().count() <= max_chars
}

fn keywords(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() > 3)
        .map(str::to_string)
        .collect()
}

fn keyword_overlap_too_low(original: &str, improved: &str) -> bool {
    let original_words = keywords(original);
    if original_words.len() <= MIN_KEYWORDS_FOR_OVERLAP {
        return false;
    }

    let improved_words: HashSet<String> = keywords(improved).into_iter().collect();
    let common = original_words
        .iter()
        .filter(|w| improved_words.contains(*w))
        .count();

    (common as f64 / original_words.len() as f64) < MIN_KEYWORD_OVERLAP
}
