//! Partial-JSON repair (spec §4.5): lets a plugin expose mid-stream,
//! valid-JSON accumulated content without waiting for the final chunk.

use serde_json::Value;

/// Close an in-progress JSON text by tracking string/escape state and a
/// stack of open brackets/braces, then appending the minimum characters
/// needed to make the prefix self-consistent. Does not itself validate the
/// result — callers check with `serde_json::from_str`.
fn close_candidate(text: &str) -> String {
    let mut in_string = false;
    let mut escaped = false;
    let mut stack: Vec<char> = Vec::new();

    for c in text.chars() {
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
            '{' | '[' => stack.push(c),
            '}' => {
                if stack.last() == Some(&'{') {
                    stack.pop();
                }
            }
            ']' => {
                if stack.last() == Some(&'[') {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    let mut candidate = text.to_string();
    if in_string {
        candidate.push('"');
    }
    for opener in stack.iter().rev() {
        candidate.push(match opener {
            '{' => '}',
            '[' => ']',
            _ => unreachable!(),
        });
    }
    candidate
}

fn is_valid_json(text: &str) -> bool {
    serde_json::from_str::<Value>(text).is_ok()
}

/// Repair a partial/truncated JSON text into the longest valid-JSON prefix
/// it can salvage, per spec §4.5:
///
/// 1. Close open strings/brackets on the full text; return it if valid.
/// 2. Otherwise binary-search for the longest prefix whose closure is
///    valid JSON.
/// 3. If nothing salvages, return the original text unchanged.
pub fn partial_json_complete(text: &str) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }

    let full_candidate = close_candidate(text);
    if is_valid_json(&full_candidate) {
        return full_candidate;
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return text.to_string();
    }

    let mut lo = 0usize;
    let mut hi = chars.len() - 1;
    let mut best: Option<String> = None;
    loop {
        let mid = lo + (hi - lo) / 2;
        let prefix: String = chars[..mid].iter().collect();
        let candidate = close_candidate(&prefix);
        if is_valid_json(&candidate) {
            best = Some(candidate);
            if mid == hi {
                break;
            }
            lo = mid + 1;
        } else {
            if mid == 0 {
                break;
            }
            hi = mid - 1;
        }
        if lo > hi {
            break;
        }
    }

    best.unwrap_or_else(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_json_passes_through_unchanged() {
        let input = r#"{"a":1,"b":[1,2,3]}"#;
        assert_eq!(partial_json_complete(input), input);
    }

    #[test]
    fn unterminated_string_is_closed() {
        let input = r#"{"name": "hello"#;
        let repaired = partial_json_complete(input);
        assert!(is_valid_json(&repaired));
        assert_eq!(repaired, r#"{"name": "hello"}"#);
    }

    #[test]
    fn nested_structures_close_in_correct_order() {
        let input = r#"{"outer": {"inner": [1, 2, 3"#;
        let repaired = partial_json_complete(input);
        assert!(is_valid_json(&repaired));
    }

    #[test]
    fn unsalvageable_text_is_returned_unchanged() {
        let input = "not json at all";
        assert_eq!(partial_json_complete(input), input);
    }

    #[test]
    fn repair_is_idempotent() {
        let input = r#"{"a": {"b": "partial"#;
        let once = partial_json_complete(input);
        let twice = partial_json_complete(&once);
        assert_eq!(once, twice);
    }
}
