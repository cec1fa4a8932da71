//! Best-effort recovery of a JSON object from generated prose.
//!
//! Generated text often wraps its JSON in a markdown fence, prefixes it with
//! commentary or trails off after it. Extraction first narrows the search to
//! a fenced block when one exists, then brace-matches from each `{` to the
//! end of its balanced object and returns the first candidate that parses.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").ok())
        .as_ref()
}

/// Contents of the first fenced code block, if any.
pub fn fenced_block(text: &str) -> Option<&str> {
    let captures = fence_regex()?.captures(text)?;
    captures.get(1).map(|m| m.as_str())
}

/// The balanced `{...}` slice starting at byte offset `start`, which must
/// point at a `{`. Braces inside string literals are ignored. `None` when the
/// object is never closed.
pub fn balanced_object(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text.get(start..)?.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return text.get(start..start + offset + 1);
                }
            }
            _ => {}
        }
    }

    None
}

fn first_object_in(text: &str) -> Option<Value> {
    text.match_indices('{').find_map(|(start, _)| {
        let candidate = balanced_object(text, start)?;
        match serde_json::from_str::<Value>(candidate) {
            Ok(value @ Value::Object(_)) => Some(value),
            _ => None,
        }
    })
}

/// Extracts the first parseable JSON object from `text`, preferring the
/// contents of a fenced block.
pub fn extract_json_object(text: &str) -> Option<Value> {
    if let Some(block) = fenced_block(text) {
        if let Some(value) = first_object_in(block) {
            return Some(value);
        }
    }
    first_object_in(text)
}

/// Extracts and deserializes the first JSON object in `text` into `T`.
pub fn parse_json_object<T: DeserializeOwned>(text: &str) -> Option<T> {
    let value = extract_json_object(text)?;
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::debug!(error = %e, "Salvaged JSON did not match expected shape");
            None
        }
    }
}
