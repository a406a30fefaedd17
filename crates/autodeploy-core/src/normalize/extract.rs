//! Balanced JSON extraction from free-form oracle text.
//!
//! Oracle replies wrap JSON in prose, code fences or both, and are sometimes
//! cut off mid-object. The scanner walks every opening bracket, finds its
//! balanced partner while respecting string literals and escapes, and returns
//! the first span that actually parses.

use serde_json::{Map, Value};

/// First balanced `{...}` span in `text` that parses as a JSON object.
pub fn first_json_object(text: &str) -> Option<Map<String, Value>> {
    balanced_spans(text, b'{', b'}').find_map(|span| match serde_json::from_str(span) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    })
}

/// First balanced `[...]` span in `text` that parses as a JSON array.
pub fn first_json_array(text: &str) -> Option<Vec<Value>> {
    balanced_spans(text, b'[', b']').find_map(|span| match serde_json::from_str(span) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    })
}

fn balanced_spans(text: &str, open: u8, close: u8) -> impl Iterator<Item = &str> + '_ {
    let bytes = text.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(move |(_, b)| **b == open)
        .filter_map(move |(start, _)| {
            balanced_end(&bytes[start..], open, close).map(|len| &text[start..start + len])
        })
}

/// Length of the balanced span starting at `bytes[0]`, if it closes.
fn balanced_end(bytes: &[u8], open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
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
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
