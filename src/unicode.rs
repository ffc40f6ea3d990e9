//! Normalisation of body text that may already be JSON.
//!
//! Upstreams frequently return JSON, sometimes a JSON-encoded string, and
//! captured text often carries `\uXXXX` escapes. [`unescape`] turns all of
//! these into one readable form: slashes and non-ASCII characters appear
//! literally, and nothing ends up escaped twice.

use serde_json::Value;

/// Normalises `input` into readable, singly-escaped JSON text.
///
/// If `input` parses as JSON whose value is truthy it is re-serialised
/// compactly. Anything else, including the falsy documents `false`, `null`,
/// `0`, `""`, `"0"` and `[]`, is treated as the content of a JSON string:
/// escape sequences already present are decoded, and the text is emitted in
/// its escaped form without the surrounding quotes.
///
/// # Examples
///
/// ```rust
/// use exchange_log::unicode::unescape;
///
/// assert_eq!(unescape(r#"{"city":"\u53f0\u5317"}"#), r#"{"city":"台北"}"#);
/// assert_eq!(unescape(r"caf\u00e9"), "café");
/// assert_eq!(unescape("plain text"), "plain text");
/// ```
pub fn unescape(input: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(input) {
        if is_truthy(&value) {
            if let Ok(encoded) = serde_json::to_string(&value) {
                return encoded;
            }
        }
    }

    let literal = format!("[\"{}\"]", escape_string_content(input));
    let decoded = match serde_json::from_str::<Vec<String>>(&literal) {
        Ok(mut items) if items.len() == 1 => items.remove(0),
        // Lone surrogate escapes and the like; keep the text as captured.
        _ => return input.to_string(),
    };
    match serde_json::to_string(&decoded) {
        Ok(encoded) => strip_quotes(&encoded).to_string(),
        Err(_) => input.to_string(),
    }
}

/// Loose truthiness of a decoded document: `null`, `false`, zero, the
/// strings `""` and `"0"` and the empty array are falsy; objects never are.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Makes `input` safe to splice between JSON string quotes.
///
/// Valid escape sequences pass through so they are decoded by the parser;
/// bare quotes, stray backslashes and control characters are escaped.
fn escape_string_content(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => match chars.get(i + 1) {
                Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't') => {
                    out.push('\\');
                    out.push(chars[i + 1]);
                    i += 1;
                }
                Some('u') if is_hex4(&chars[i + 2..]) => {
                    out.extend(&chars[i..i + 6]);
                    i += 5;
                }
                _ => out.push_str("\\\\"),
            },
            '"' => out.push_str("\\\""),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
        i += 1;
    }
    out
}

fn is_hex4(chars: &[char]) -> bool {
    chars.len() >= 4 && chars[..4].iter().all(|c| c.is_ascii_hexdigit())
}

fn strip_quotes(encoded: &str) -> &str {
    encoded
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_is_reserialized_with_literal_unicode_and_slashes() {
        let input = r#"{ "url": "https:\/\/example.test\/a", "name": "\u4e2d\u6587" }"#;
        assert_eq!(
            unescape(input),
            r#"{"url":"https://example.test/a","name":"中文"}"#
        );
    }

    #[test]
    fn test_object_key_order_is_preserved() {
        assert_eq!(unescape(r#"{"z":1,"a":2}"#), r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn test_array_round_trip() {
        assert_eq!(unescape("[1, \"two\", {\"three\": 3}]"), r#"[1,"two",{"three":3}]"#);
    }

    #[test]
    fn test_json_encoded_string_keeps_its_quotes() {
        assert_eq!(unescape(r#""\u00e9t\u00e9""#), r#""été""#);
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(unescape("hello world"), "hello world");
    }

    #[test]
    fn test_escape_sequences_in_plain_text_are_decoded() {
        assert_eq!(unescape(r"\u4f60\u597d, world"), "你好, world");
    }

    #[test]
    fn test_control_characters_and_quotes_are_escaped_once() {
        assert_eq!(unescape("line one\nshe said \"hi\""), r#"line one\nshe said \"hi\""#);
    }

    #[test]
    fn test_stray_backslash_is_preserved() {
        assert_eq!(unescape(r"C:\data\x"), r"C:\\data\\x");
    }

    #[test]
    fn test_falsy_documents_fall_through_to_string_path() {
        // These parse as JSON but are falsy, so they take the raw-string route.
        assert_eq!(unescape("false"), "false");
        assert_eq!(unescape("null"), "null");
        assert_eq!(unescape("0"), "0");
        assert_eq!(unescape("0.0"), "0.0");
        assert_eq!(unescape("[]"), "[]");
        assert_eq!(unescape(""), "");
        assert_eq!(unescape(r#""""#), r#"\"\""#);
    }

    #[test]
    fn test_truthy_scalars_are_reserialized() {
        assert_eq!(unescape("true"), "true");
        assert_eq!(unescape(" 42 "), "42");
        assert_eq!(unescape("{}"), "{}");
    }

    #[test]
    fn test_idempotent_on_plain_ascii() {
        for input in ["hello", "GET /ping?x=1", "a,b;c=d", "RESPONSE_NOT_LOGGEABLE", "multi\nline"] {
            let once = unescape(input);
            assert_eq!(unescape(&once), once, "input {input:?}");
        }
    }
}
