use serde::Serialize;

use crate::sanitizer::clean::SINGLE_LINE_MAX_CHARS;
use crate::sanitizer::denylist::classify;

pub const DANGEROUS_CONTENT_REASON: &str = "Input contains potentially dangerous content";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizationVerdict {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SanitizationVerdict {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Strict classifier for short fields: length ceiling of 500 characters plus
/// the injection denylist. The reason never names the matched pattern.
pub fn validate_input(input: &str) -> SanitizationVerdict {
    if input.is_empty() {
        return SanitizationVerdict::invalid("Input is required");
    }

    if input.chars().count() > SINGLE_LINE_MAX_CHARS {
        return SanitizationVerdict::invalid("Input exceeds maximum length");
    }

    if classify(input).is_some() {
        return SanitizationVerdict::invalid(DANGEROUS_CONTENT_REASON);
    }

    SanitizationVerdict::valid()
}

/// Length-only classifier for large text blocks (pasted resumes, job
/// descriptions). The denylist is not applied.
pub fn validate_input_large(input: &str, max_len: usize) -> SanitizationVerdict {
    if input.is_empty() {
        return SanitizationVerdict::invalid("Input is required");
    }

    if input.chars().count() > max_len {
        return SanitizationVerdict::invalid(format!(
            "Input exceeds maximum length ({max_len})"
        ));
    }

    SanitizationVerdict::valid()
}
