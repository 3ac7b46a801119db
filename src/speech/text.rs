//! Text cleanup applied before synthesis.
//!
//! Generated responses carry markdown and symbol noise that synthesizers
//! read out loud ("asterisk asterisk"). Strip it down to plain speakable
//! text.

use regex::Regex;
use std::sync::LazyLock;

static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[*_]{1,3}").expect("literal pattern")
});
static BACKTICKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`+").expect("literal pattern")
});
static HEADERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^#+\s*").expect("literal pattern")
});
static LINKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]+)\]\([^)]*\)").expect("literal pattern")
});
static SYMBOL_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[~@^|\\<>{}\[\]#]").expect("literal pattern")
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").expect("literal pattern")
});

/// Reduces markdown-flavoured text to something worth speaking.
///
/// Returns an empty string when nothing speakable remains; callers skip
/// synthesis for those chunks.
pub fn clean_for_speech(text: &str) -> String {
    let text = EMPHASIS.replace_all(text, "");
    let text = BACKTICKS.replace_all(&text, "");
    let text = HEADERS.replace_all(&text, "");
    let text = LINKS.replace_all(&text, "$1");
    let text = SYMBOL_NOISE.replace_all(&text, " ");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_owned()
}
