//! Post-processing: deterministic cleanup of the model's delimited output.
//!
//! Even with "Do not write anything else" in the prompt, chat models
//! sometimes wrap the table in a ```` ```text ```` fence or answer with
//! Windows line endings. These rules fix such wrapper artefacts so the
//! parser sees the table the model meant. Field text is left alone except
//! for invisible Unicode (rule 3), which is removed wherever it appears,
//! including inside fields.
//!
//! Rules (applied in order):
//! 1. Strip a code fence wrapping the whole response (optional)
//! 2. Normalise line endings (CRLF / CR → LF)
//! 3. Strip invisible Unicode (BOM, zero-width spaces)
//! 4. Trim leading/trailing whitespace of the whole response

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all post-processing rules to the raw model output.
pub fn clean_model_output(input: &str, strip_fences: bool) -> String {
    let s = if strip_fences {
        strip_outer_fences(input)
    } else {
        input.to_string()
    };
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_outer_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip invisible Unicode ──────────────────────────────────────────

const INVISIBLE: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

fn remove_invisible_chars(input: &str) -> String {
    input.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}
