//! String transforms applied to user text before it reaches a prompt or storage.
//!
//! All lengths are in characters; truncation never splits a code point.

use std::sync::LazyLock;

use regex::{Captures, Regex};

pub const PROMPT_MAX_CHARS: usize = 5000;
pub const SINGLE_LINE_MAX_CHARS: usize = 500;
pub const MULTILINE_MAX_CHARS: usize = 10_000;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static ANGLE_BRACKETS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[<>]").unwrap());
static ROLE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(/?)(user_data|system|assistant)>").unwrap());
static MODEL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[/?INST\]|<</?SYS>>|\[/?SYSTEM\]").unwrap());
static LINE_ENDING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r\n?").unwrap());
static HORIZONTAL_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static ANY_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static WS_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

/// Neutralizes markup that could pass for prompt structure.
///
/// `<system>` becomes `[system]`, `<|` becomes `[|`, and `"""` is
/// backslash-escaped, so the text can be interpolated into a template
/// without being read as a role marker.
pub fn escape_delimiters(input: &str) -> String {
    let text = input.replace(r#"""""#, r#"\"\"\""#);
    let text = ROLE_TAG.replace_all(&text, |caps: &Captures| {
        format!("[{}{}]", &caps[1], caps[2].to_ascii_lowercase())
    });
    text.replace("<|", "[|").replace("|>", "|]")
}

/// Light cleanup for free text that feeds an AI prompt and must stay readable.
///
/// Strips HTML tags, escapes delimiters, drops jailbreak-framework markers
/// (`[INST]`, `<<SYS>>`, `[SYSTEM]`), normalizes line endings and horizontal
/// whitespace, caps blank-line runs at one empty line, then truncates and
/// trims. Applying it twice yields the same output as applying it once.
pub fn sanitize_for_prompt(input: &str, max_len: usize) -> String {
    if input.is_empty() {
        return String::new();
    }

    // Removing a marker can join the text around it into a new one
    // ("[IN[INST]ST]"), so the pass reruns until nothing changes. Every
    // changing pass consumes a `<`, a `[` or a quote run, which bounds the
    // loop by the input length.
    let mut text = input.to_string();
    for _ in 0..=input.len() {
        let stripped = HTML_TAG.replace_all(&text, "");
        let escaped = escape_delimiters(&stripped);
        let next = MODEL_MARKER.replace_all(&escaped, "").into_owned();
        if next == text {
            break;
        }
        text = next;
    }

    let text = LINE_ENDING.replace_all(&text, "\n");
    let text = HORIZONTAL_WS.replace_all(&text, " ");
    let text = BLANK_LINES.replace_all(&text, "\n\n");

    truncate_chars(&text, max_len).trim().to_string()
}

/// Strict single-line sanitizer for short form fields.
///
/// Tag stripping runs before the raw `<`/`>` removal, so `b<script>` becomes
/// `b`, not `bscript`.
pub fn sanitize_user_input(input: &str) -> String {
    let text = strip_markup(input);
    let text = ANY_WS.replace_all(&text, " ");
    truncate_chars(&text, SINGLE_LINE_MAX_CHARS)
        .trim()
        .to_string()
}

/// Like [`sanitize_user_input`] but keeps line breaks.
pub fn sanitize_user_multiline(input: &str, max_len: usize) -> String {
    let text = strip_markup(input);
    let text = LINE_ENDING.replace_all(&text, "\n");
    let joined = text
        .split('\n')
        .map(|line| WS_RUN.replace_all(line, " ").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n");

    truncate_chars(joined.trim(), max_len).trim().to_string()
}

fn strip_markup(input: &str) -> String {
    let without_tags = HTML_TAG.replace_all(input, "");
    ANGLE_BRACKETS.replace_all(&without_tags, "").into_owned()
}

/// Returns at most the first `max_chars` characters of `text`.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
