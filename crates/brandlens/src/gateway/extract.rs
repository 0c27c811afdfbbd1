//! Best-effort recovery of JSON from model output that may be wrapped in
//! prose or fenced code blocks.

use regex::Regex;
use serde_json::Value;

/// Extract a JSON value from possibly-markdown text.
///
/// Tries, in order: a direct parse of the whole text, each fenced
/// ` ```json `/` ``` ` block, then each outermost brace-delimited object.
/// Returns `None` when nothing parses; never guesses.
pub fn extract_structured_data(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Some(value);
    }

    let fence = Regex::new(r"(?s)```(?:json)?\s*(.*?)```").unwrap();
    for capture in fence.captures_iter(text) {
        if let Ok(value) = serde_json::from_str::<Value>(capture[1].trim()) {
            return Some(value);
        }
    }

    for candidate in brace_candidates(text) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    None
}

/// Outermost `{...}` spans, found by depth counting with string awareness.
fn brace_candidates(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        spans.push(&text[start..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    spans
}
