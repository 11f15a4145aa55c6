//! Body and query decoding for captured requests

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Map, Value};

/// Check whether a `Content-Type` value names a JSON body
pub fn is_json_mime(content_type: &str) -> bool {
    let mime = essence(content_type);
    mime == "application/json" || mime.ends_with("+json")
}

/// Decode a body according to its `Content-Type`
///
/// Returns `None` for an empty body. JSON that fails to parse is kept as
/// text, and bytes that are not UTF-8 are wrapped as `{"base64": ...}`.
pub fn decode_body(content_type: Option<&str>, bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }

    let mime = content_type.map(essence).unwrap_or_default();

    if is_json_mime(&mime) {
        if let Ok(value) = serde_json::from_slice(bytes) {
            return Some(value);
        }
        return Some(text_or_base64(bytes));
    }

    if mime == "application/x-www-form-urlencoded" {
        return Some(Value::Object(decode_pairs(bytes)));
    }

    if mime.starts_with("text/") {
        return Some(Value::String(String::from_utf8_lossy(bytes).into_owned()));
    }

    Some(text_or_base64(bytes))
}

/// Decode `a=1&b=2` pairs into an object; repeated keys become arrays
pub fn decode_pairs(input: &[u8]) -> Map<String, Value> {
    let mut map = Map::new();

    for (key, value) in url::form_urlencoded::parse(input) {
        let value = Value::String(value.into_owned());
        match map.get_mut(key.as_ref()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.into_owned(), value);
            }
        }
    }

    map
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn text_or_base64(bytes: &[u8]) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(text) => Value::String(text.to_string()),
        Err(_) => json!({ "base64": STANDARD.encode(bytes) }),
    }
}
