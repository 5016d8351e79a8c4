//! Structural payload adapter
//!
//! The runtime emits event payloads either as JSON or in a
//! Python-literal style that uses single quotes for keys and strings,
//! `True`/`False`/`None` for literals and `b'...'` for byte strings. This
//! module is the single place that knows about the second convention: it
//! rewrites such payloads into JSON and hands back a `serde_json::Value`, so
//! the extractor only ever deals with one normalized shape.

use serde_json::Value;

/// Parse a structural payload written in either quoting convention.
///
/// Strict JSON is tried first; on failure the payload is rewritten with
/// [`to_json`] and parsed again.
///
/// # Errors
///
/// Returns the `serde_json` error from the second attempt when neither
/// reading produces a value.
///
/// # Examples
///
/// ```
/// use agentchat::stream::payload::parse_structural;
///
/// let value = parse_structural("{'delta': {'text': 'Hi'}, 'done': False}").unwrap();
/// assert_eq!(value["delta"]["text"], "Hi");
/// assert_eq!(value["done"], false);
/// ```
pub fn parse_structural(payload: &str) -> Result<Value, serde_json::Error> {
    if let Ok(value) = serde_json::from_str(payload) {
        return Ok(value);
    }
    serde_json::from_str(&to_json(payload))
}

/// Rewrite a Python-literal style payload as JSON text.
///
/// Input that is already JSON passes through unchanged apart from
/// whitespace inside strings being escaped.
pub fn to_json(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len() + 8);
    let chars: Vec<char> = payload.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                i = copy_string(&chars, i, &mut out);
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let next_is_quote = matches!(chars.get(i), Some('\'') | Some('"'));
                match word.as_str() {
                    "True" => out.push_str("true"),
                    "False" => out.push_str("false"),
                    "None" => out.push_str("null"),
                    // Byte/unicode string prefixes: keep only the string.
                    "b" | "u" if next_is_quote => {}
                    _ => out.push_str(&word),
                }
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

/// Copy the string literal starting at `start` into `out` as a JSON string.
/// Returns the index just past the closing quote (or the end of input).
fn copy_string(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    out.push('"');

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            match chars.get(i + 1) {
                Some('\'') => out.push('\''),
                Some('x') => {
                    let hex: String = chars.iter().skip(i + 2).take(2).collect();
                    if hex.len() == 2 && hex.chars().all(|h| h.is_ascii_hexdigit()) {
                        out.push_str("\\u00");
                        out.push_str(&hex);
                        i += 4;
                        continue;
                    }
                    out.push_str("\\\\x");
                }
                Some(next) => {
                    out.push('\\');
                    out.push(*next);
                }
                None => out.push_str("\\\\"),
            }
            i += 2;
            continue;
        }
        if c == quote {
            out.push('"');
            return i + 1;
        }
        match c {
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
        i += 1;
    }

    // Unterminated literal: leave it open so the parse fails loudly.
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strict_json_passes_through() {
        let value = parse_structural(r#"{"delta": {"text": "Hi"}}"#).unwrap();
        assert_eq!(value, json!({"delta": {"text": "Hi"}}));
    }

    #[test]
    fn test_single_quoted_keys_and_strings() {
        let value = parse_structural("{'contentBlockDelta': {'delta': {'text': 'Hi'}}}").unwrap();
        assert_eq!(value["contentBlockDelta"]["delta"]["text"], "Hi");
    }

    #[test]
    fn test_python_literals() {
        let value = parse_structural("{'a': True, 'b': False, 'c': None}").unwrap();
        assert_eq!(value, json!({"a": true, "b": false, "c": null}));
    }

    #[test]
    fn test_embedded_double_quote_in_single_quoted_string() {
        let value = parse_structural(r#"{'text': 'say "hi"'}"#).unwrap();
        assert_eq!(value["text"], "say \"hi\"");
    }

    #[test]
    fn test_escaped_single_quote() {
        let value = parse_structural(r"{'text': 'it\'s'}").unwrap();
        assert_eq!(value["text"], "it's");
    }

    #[test]
    fn test_double_quoted_string_with_apostrophe() {
        let value = parse_structural(r#"{'text': "it's"}"#).unwrap();
        assert_eq!(value["text"], "it's");
    }

    #[test]
    fn test_hex_escape() {
        let value = parse_structural(r"{'text': 'caf\xe9'}").unwrap();
        assert_eq!(value["text"], "caf\u{e9}");
    }

    #[test]
    fn test_byte_string_prefix() {
        let value = parse_structural("{'bytes': b'SGk='}").unwrap();
        assert_eq!(value["bytes"], "SGk=");
    }

    #[test]
    fn test_identifiers_inside_strings_untouched() {
        let value = parse_structural("{'text': 'None of True'}").unwrap();
        assert_eq!(value["text"], "None of True");
    }

    #[test]
    fn test_malformed_payload_fails() {
        assert!(parse_structural("{'delta': {'text': 'Hi'").is_err());
        assert!(parse_structural("{'agent': <Agent object at 0x7f>}").is_err());
    }
}
