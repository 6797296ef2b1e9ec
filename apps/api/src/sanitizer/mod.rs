//! Input sanitization and AI output validation.
//!
//! Everything here is synchronous and pure: malformed or hostile text is
//! reported through [`SanitizationVerdict`], never through an error.

pub mod clean;
pub mod denylist;
pub mod fields;
pub mod output;
pub mod prompts;
pub mod validation;

pub use clean::{
    sanitize_for_prompt, sanitize_user_input, sanitize_user_multiline, MULTILINE_MAX_CHARS,
    PROMPT_MAX_CHARS,
};
pub use denylist::classify;
pub use fields::{sanitize_language, sanitize_section_type, Language, SectionType};
pub use output::{validate_improved_text, validate_text_length, IMPROVED_TEXT_MAX_CHARS};
pub use prompts::SECURITY_PREAMBLE;
pub use validation::{validate_input, validate_input_large, SanitizationVerdict};
