//! Ordered denylist of prompt-injection and script-injection patterns.
//!
//! The table is declarative: `(category, pattern)` rows evaluated top to
//! bottom, first match wins. Appending a row never changes which row matches
//! an input that an earlier row already caught.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    /// "ignore previous instructions", "you are now", "DAN", ...
    InstructionOverride,
    /// `system:`, `<|...|>`, fenced blocks, `[INST]`, tokenizer specials.
    RoleMarker,
    /// "jailbreak", "bypass the filter", "reveal your instructions", ...
    Jailbreak,
    /// `<script`, `javascript:`, `onerror=`, `eval(`, `__proto__`, ...
    ScriptInjection,
}

impl fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InstructionOverride => "instruction_override",
            Self::RoleMarker => "role_marker",
            Self::Jailbreak => "jailbreak",
            Self::ScriptInjection => "script_injection",
        })
    }
}

use PatternCategory::*;

pub(crate) const INPUT_DENYLIST: &[(PatternCategory, &str)] = &[
    // Role and instruction manipulation
    (InstructionOverride, r"(?i)ignore\s+previous\s+instructions"),
    (InstructionOverride, r"(?i)ignore\s+all\s+previous\s+instructions"),
    (InstructionOverride, r"(?i)ignore\s+the\s+above"),
    (InstructionOverride, r"(?i)disregard\s+(your\s+)?instructions"),
    (InstructionOverride, r"(?i)disregard\s+(all\s+)?previous"),
    (InstructionOverride, r"(?i)override\s+(your\s+)?instructions"),
    (InstructionOverride, r"(?i)forget\s+(everything|all|your)"),
    (InstructionOverride, r"(?i)you\s+are\s+now"),
    (InstructionOverride, r"(?i)you\s+must\s+now"),
    (InstructionOverride, r"(?i)act\s+as\s+if"),
    (InstructionOverride, r"(?i)pretend\s+to\s+be"),
    (InstructionOverride, r"(?i)roleplay\s+as"),
    (InstructionOverride, r"(?i)from\s+now\s+on"),
    (InstructionOverride, r"(?i)new\s+instructions?"),
    // "Do Anything Now"; case-sensitive so the name "Dan" passes
    (InstructionOverride, r"\bDAN\b"),
    (InstructionOverride, r"(?i)do\s+anything\s+now"),
    (InstructionOverride, r"(?i)out\s+of\s+character"),
    // System / role markers
    (RoleMarker, r"(?i)system\s*:"),
    (RoleMarker, r"(?i)assistant\s*:"),
    (RoleMarker, r"(?i)user\s*:"),
    (RoleMarker, r"(?i)\binstructions?\s*:"),
    (RoleMarker, r"(?i)\bprompt\s*:"),
    (RoleMarker, r"(?i)\brole\s*:"),
    (RoleMarker, r"(?i)\bcontext\s*:"),
    // Special tokens and delimiters
    (RoleMarker, r"(?i)<\|.*?\|>"),
    (RoleMarker, r"(?s)```.*?```"),
    (RoleMarker, r"(?i)\[INST\]"),
    (RoleMarker, r"(?i)\[/INST\]"),
    (RoleMarker, r"(?i)<<SYS>>"),
    (RoleMarker, r"(?i)<</SYS>>"),
    (RoleMarker, r"(?i)<\|endoftext\|>"),
    (RoleMarker, r"(?i)<\|im_start\|>"),
    (RoleMarker, r"(?i)<\|im_end\|>"),
    // Jailbreak vocabulary
    (Jailbreak, r"(?i)jailbreak"),
    (Jailbreak, r"(?i)prompt\s+injection"),
    (Jailbreak, r"(?i)bypass\s+(the\s+)?filter"),
    (Jailbreak, r"(?i)bypass\s+(the\s+)?restriction"),
    (Jailbreak, r"(?i)escape\s+(the\s+)?sandbox"),
    (Jailbreak, r"(?i)reveal\s+(your\s+)?instructions"),
    (Jailbreak, r"(?i)show\s+(me\s+)?(your\s+)?system\s+prompt"),
    (Jailbreak, r"(?i)what\s+are\s+your\s+instructions"),
    // Script injection (XSS)
    (ScriptInjection, r"(?i)<script"),
    (ScriptInjection, r"(?i)javascript:"),
    (ScriptInjection, r"(?i)onerror="),
    (ScriptInjection, r"(?i)onload="),
    (ScriptInjection, r"(?i)eval\("),
    (ScriptInjection, r"(?i)function\s*\("),
    (ScriptInjection, r"(?i)alert\("),
    (ScriptInjection, r"(?i)document\."),
    (ScriptInjection, r"(?i)window\."),
    (ScriptInjection, r"(?i)constructor\s*\["),
    (ScriptInjection, r"(?i)__proto__"),
];

/// A compiled denylist, evaluated in table order.
pub struct Denylist {
    rules: Vec<(PatternCategory, Regex)>,
}

impl Denylist {
    /// Compiles a pattern table. Panics on an invalid pattern; tables are
    /// compile-time constants covered by tests.
    pub fn compile(table: &[(PatternCategory, &str)]) -> Self {
        let rules = table
            .iter()
            .map(|&(category, pattern)| {
                let regex = Regex::new(pattern)
                    .unwrap_or_else(|e| panic!("invalid denylist pattern {pattern:?}: {e}"));
                (category, regex)
            })
            .collect();
        Self { rules }
    }

    /// Index and category of the first matching rule.
    pub fn first_match(&self, text: &str) -> Option<(usize, PatternCategory)> {
        self.rules
            .iter()
            .position(|(_, re)| re.is_match(text))
            .map(|idx| (idx, self.rules[idx].0))
    }
}

static INPUT_RULES: LazyLock<Denylist> = LazyLock::new(|| Denylist::compile(INPUT_DENYLIST));

/// Category of the first input-denylist rule matching `text`.
///
/// For server-side logging only; callers must not echo it back to clients.
pub fn classify(text: &str) -> Option<PatternCategory> {
    INPUT_RULES.first_match(text).map(|(_, category)| category)
}
