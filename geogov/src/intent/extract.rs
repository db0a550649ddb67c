//! Extraction of JSON objects from raw planner output.
//!
//! Models wrap their answer in prose often enough that the resolver scans
//! for balanced top-level objects instead of parsing the whole blob. The
//! scan tracks string and escape state so braces inside string literals do
//! not confuse the depth count.

use serde_json::Value;

/// Extract every parseable top-level JSON object from a text blob, in order.
pub fn extract_json_objects(text: &str) -> Vec<Value> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] != b'{' {
            index += 1;
            continue;
        }
        match balanced_object_end(bytes, index) {
            Some(end) => {
                if let Ok(value) = serde_json::from_slice::<Value>(&bytes[index..end]) {
                    if value.is_object() {
                        found.push(value);
                        index = end;
                        continue;
                    }
                }
                index += 1;
            }
            None => index += 1,
        }
    }
    found
}

/// Index one past the `}` closing the object starting at `start`, or None
/// when the braces never balance.
fn balanced_object_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}
