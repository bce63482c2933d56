//! Tolerant JSON object extraction from raw model text.
//!
//! Models asked for JSON over a plain-text channel often wrap it in a
//! markdown fence or surround it with prose. [`extract_json`] recovers the
//! object in either case and signals failure only through `None`.

use serde_json::{Map, Value};

/// Opening fence marker.
const FENCE: &str = "```";

/// Recover a JSON object from raw model text.
///
/// Strategies, first success wins:
/// 1. Strip a surrounding markdown fence and decode the whole text.
/// 2. Decode the span from the first `{` to the last `}`.
///
/// Arrays and scalars at the root are rejected. This function never panics
/// and never errors.
///
/// # Examples
///
/// ```
/// use llm_validator::extract::extract_json;
///
/// let obj = extract_json("```json\n{\"name\": \"John\"}\n```").unwrap();
/// assert_eq!(obj["name"], "John");
///
/// let obj = extract_json("Sure! Here it is: {\"age\": 30} Hope that helps.").unwrap();
/// assert_eq!(obj["age"], 30);
///
/// assert!(extract_json("[1, 2, 3]").is_none());
/// assert!(extract_json("no json here").is_none());
/// ```
pub fn extract_json(text: &str) -> Option<Map<String, Value>> {
    let cleaned = strip_fences(text);

    if let Some(obj) = decode_object(cleaned) {
        return Some(obj);
    }

    outer_braces(cleaned).and_then(decode_object)
}

/// Strip one leading `` ``` `` / `` ```json `` fence and one trailing `` ``` ``
/// fence from trimmed text, then trim again.
///
/// Text without fences is returned trimmed and otherwise unchanged.
///
/// # Examples
///
/// ```
/// use llm_validator::extract::strip_fences;
///
/// assert_eq!(strip_fences("```json\n{}\n```"), "{}");
/// assert_eq!(strip_fences("  {}  "), "{}");
/// ```
pub fn strip_fences(text: &str) -> &str {
    let mut s = text.trim();

    if let Some(rest) = s.strip_prefix(FENCE) {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        s = rest.strip_prefix('\n').unwrap_or(rest);
    }

    if let Some(rest) = s.strip_suffix(FENCE) {
        s = rest.strip_suffix('\n').unwrap_or(rest);
    }

    s.trim()
}

/// The greedy span from the first `{` to the last `}`, if any.
fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn decode_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    // ── strip_fences ──

    #[test]
    fn strip_fences_json_marker() {
        assert_eq!(strip_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn strip_fences_bare_marker() {
        assert_eq!(strip_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn strip_fences_without_newlines() {
        assert_eq!(strip_fences("```json{\"a\": 1}```"), "{\"a\": 1}");
    }

    #[test]
    fn strip_fences_surrounding_whitespace() {
        assert_eq!(strip_fences("  \n```json\n{}\n```\n  "), "{}");
    }

    #[test]
    fn strip_fences_plain_text_untouched() {
        assert_eq!(strip_fences("hello"), "hello");
    }

    // ── extract_json ──

    #[test]
    fn extract_plain_object() {
        let got = extract_json(r#"{"name": "John", "age": 30}"#).unwrap();
        assert_eq!(got, obj(json!({"name": "John", "age": 30})));
    }

    #[test]
    fn extract_fenced_object_round_trip() {
        let original = obj(json!({
            "name": "Ada",
            "tags": ["math", "engines"],
            "nested": {"born": 1815, "alive": false, "note": null}
        }));
        let encoded = serde_json::to_string_pretty(&original).unwrap();

        for fenced in [
            format!("```json\n{}\n```", encoded),
            format!("```\n{}\n```", encoded),
            format!("```json{}```", encoded),
            encoded.clone(),
        ] {
            assert_eq!(extract_json(&fenced), Some(original.clone()), "input: {}", fenced);
        }
    }

    #[test]
    fn extract_object_surrounded_by_prose() {
        let text = "Sure! Here is the data:\n{\"name\": \"John\"}\nLet me know if you need more.";
        let got = extract_json(text).unwrap();
        assert_eq!(got["name"], "John");
    }

    #[test]
    fn extract_fenced_block_after_prose() {
        // Prose before the fence means step 1 fails; the brace span still matches.
        let text = "Result:\n```json\n{\"ok\": true}\n```";
        let got = extract_json(text).unwrap();
        assert_eq!(got["ok"], true);
    }

    #[test]
    fn extract_nested_braces_greedy_span() {
        let text = "x {\"a\": {\"b\": {\"c\": 1}}} y";
        let got = extract_json(text).unwrap();
        assert_eq!(got["a"]["b"]["c"], 1);
    }

    #[test]
    fn extract_rejects_root_array() {
        assert!(extract_json("[1, 2, 3]").is_none());
        assert!(extract_json("```json\n[{\"a\": 1}]\n```").is_some_and(|m| m["a"] == 1));
    }

    #[test]
    fn extract_rejects_scalars() {
        assert!(extract_json("42").is_none());
        assert!(extract_json("\"just a string\"").is_none());
        assert!(extract_json("null").is_none());
    }

    #[test]
    fn extract_none_without_braces() {
        assert!(extract_json("I cannot help with that.").is_none());
        assert!(extract_json("").is_none());
        assert!(extract_json("   ").is_none());
    }

    #[test]
    fn extract_none_for_reversed_braces() {
        assert!(extract_json("} backwards {").is_none());
    }

    #[test]
    fn extract_none_for_malformed_span() {
        assert!(extract_json("{\"name\": \"John\",, }").is_none());
        assert!(extract_json("{\"unterminated\": ").is_none());
    }

    #[test]
    fn extract_two_objects_greedy_span_fails() {
        // First `{` to last `}` covers both objects, which is not valid JSON.
        assert!(extract_json("{\"a\": 1} and {\"b\": 2}").is_none());
    }

    #[test]
    fn extract_preserves_key_order() {
        let got = extract_json(r#"{"z": 1, "a": 2, "m": 3}"#).unwrap();
        let keys: Vec<&str> = got.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }
}
