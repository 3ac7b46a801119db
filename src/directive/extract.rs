//! Directive extraction from completed (or truncated) turn text.
//!
//! Models emit the payload as JSON between marker tags, but streams get cut
//! off mid-object and small models produce slightly broken JSON. Extraction
//! is therefore tolerant: close-tag missing falls back to brace matching,
//! quote style and trailing commas are repaired, and every failure is just
//! "no directive".

use crate::directive::{CLOSE_MARKER, Directive, OPEN_MARKER};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r",(\s*[}\]])").expect("literal pattern")
});

/// Extracts the first directive from raw turn text.
///
/// Returns `None` for absent markers, unbalanced truncation, unparseable
/// payloads, and invalid shapes alike; most turns carry no directive and
/// callers never treat `None` as an error.
pub fn extract(raw: &str) -> Option<Directive> {
    let start = raw.find(OPEN_MARKER)? + OPEN_MARKER.len();
    let after = &raw[start..];

    let candidate = match after.find(CLOSE_MARKER) {
        Some(end) => after[..end].trim(),
        None => balanced_object(after.trim_start())?,
    };

    let repaired = repair(candidate);
    let value: Value = serde_json::from_str(&repaired).ok()?;
    validate(&value)
}

/// Prefix of `text` up to where the top-level brace depth returns to zero.
///
/// Braces inside JSON strings do not count; a quote toggles string state
/// unless escaped. `None` when the depth never returns to zero.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escape = false;

    for (i, c) in text.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match c {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Quote-style and trailing-comma repair.
fn repair(candidate: &str) -> String {
    let text = if candidate.contains('\'') && !candidate.contains('"') {
        candidate.replace('\'', "\"")
    } else {
        candidate.to_owned()
    };
    TRAILING_COMMA.replace_all(&text, "$1").into_owned()
}

/// Shape validation: `name` non-empty, `arguments` an object (possibly
/// arriving as a stringified object).
fn validate(value: &Value) -> Option<Directive> {
    let call = value.as_object()?;
    let name = call.get("name")?.as_str()?;
    if name.is_empty() {
        return None;
    }
    let arguments = match call.get("arguments")? {
        Value::Object(map) => map.clone(),
        Value::String(nested) => parse_nested_arguments(nested)?,
        _ => return None,
    };
    Some(Directive {
        name: name.to_owned(),
        arguments,
    })
}

fn parse_nested_arguments(nested: &str) -> Option<serde_json::Map<String, Value>> {
    let parsed: Value = serde_json::from_str(nested)
        .or_else(|_| serde_json::from_str(&nested.replace('\'', "\"")))
        .ok()?;
    match parsed {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
