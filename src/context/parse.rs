//! Parsing of query strings, cookie headers and header maps.
//!
//! Pure functions; validation against schemas happens in `context::request`.

use std::collections::HashMap;

use axum::http::HeaderMap;
use serde_json::{Map, Number, Value};

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Why a cookie header could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieError {
    /// Longer than the configured bound.
    TooLong,
}

/// Parse a query string with scalar coercion.
///
/// - missing or empty value, or `true` → `true`
/// - `false` → `false`
/// - `null` → `null`
/// - `undefined` → the key is omitted
/// - a value containing `,` → array of strings
/// - a value that parses entirely as a number → number
/// - anything else → the decoded string
pub fn parse_query(query: &str) -> Map<String, Value> {
    let mut out = Map::new();

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if key.is_empty() {
            continue;
        }
        if let Some(value) = coerce_query_value(&value) {
            out.insert(key.into_owned(), value);
        }
    }

    out
}

fn coerce_query_value(raw: &str) -> Option<Value> {
    let value = match raw {
        "" | "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        "undefined" => return None,
        _ if raw.contains(',') => Value::Array(
            raw.split(',')
                .map(|part| Value::String(part.to_string()))
                .collect(),
        ),
        _ => parse_number(raw).unwrap_or_else(|| Value::String(raw.to_string())),
    };
    Some(value)
}

/// Numeric reading of a query value: `007`, `1.`, `.5` and `+5` all count.
///
/// Whole numbers become integers.
fn parse_number(raw: &str) -> Option<Value> {
    let number = raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())?;
    if number.fract() == 0.0 && number.abs() < MAX_SAFE_INTEGER {
        return Some(Value::from(number as i64));
    }
    Number::from_f64(number).map(Value::Number)
}

/// Parse a single cookie header into name/value pairs.
///
/// Pairs split on `;` (leading whitespace trimmed), then on the first `=`.
/// Entries with an empty name are dropped.
pub fn parse_cookies(header: &str, max_len: usize) -> Result<HashMap<String, String>, CookieError> {
    if header.chars().count() > max_len {
        return Err(CookieError::TooLong);
    }

    let mut cookies = HashMap::new();
    for pair in header.split(';').map(str::trim_start) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        if name.is_empty() {
            continue;
        }
        cookies.insert(name.to_string(), value.to_string());
    }

    Ok(cookies)
}

/// Copy at most `cap` header entries into a map with lowercase keys.
///
/// Every entry counts toward the cap, duplicates included; the first value
/// seen for a name wins.
pub fn collect_headers(headers: &HeaderMap, cap: usize) -> HashMap<String, String> {
    let mut out = HashMap::new();

    for (name, value) in headers.iter().take(cap) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        out.entry(name.as_str().to_ascii_lowercase())
            .or_insert_with(|| value.to_string());
    }

    out
}

/// Render a string map as a JSON object for validation.
pub fn to_object(map: &HashMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_query_coercion() {
        assert_eq!(Value::Object(parse_query("a")), json!({"a": true}));
        assert_eq!(Value::Object(parse_query("a=false")), json!({"a": false}));
        assert_eq!(Value::Object(parse_query("a=1,2")), json!({"a": ["1", "2"]}));
        assert_eq!(Value::Object(parse_query("a=5")), json!({"a": 5}));
        assert_eq!(Value::Object(parse_query("a=hello")), json!({"a": "hello"}));
        assert_eq!(Value::Object(parse_query("a=-2.5")), json!({"a": -2.5}));
        assert_eq!(
            Value::Object(parse_query("a=007&b=1.&c=.5&d=%2B5&e=1e3")),
            json!({"a": 7, "b": 1, "c": 0.5, "d": 5, "e": 1000})
        );
        assert_eq!(Value::Object(parse_query("a=NaN&b=inf")), json!({"a": "NaN", "b": "inf"}));
        assert_eq!(Value::Object(parse_query("a=null")), json!({"a": null}));
        assert_eq!(Value::Object(parse_query("a=undefined&b")), json!({"b": true}));
        assert_eq!(
            Value::Object(parse_query("msg=hello%20world&=skip")),
            json!({"msg": "hello world"})
        );
    }

    #[test]
    fn test_cookie_parsing() {
        let cookies = parse_cookies("custom=value; other=a=b;flag; =x", 1000).unwrap();
        assert_eq!(cookies["custom"], "value");
        assert_eq!(cookies["other"], "a=b");
        assert_eq!(cookies["flag"], "");
        assert!(!cookies.contains_key(""));
        assert_eq!(cookies.len(), 3);
    }

    #[test]
    fn test_cookie_length_bound() {
        let long = format!("custom={}", "x".repeat(1000));
        assert_eq!(parse_cookies(&long, 1000), Err(CookieError::TooLong));
        assert!(parse_cookies("custom=value;", 1000).is_ok());

        // 600 two-byte characters stay under a 1000 character bound.
        let wide = format!("c={}", "é".repeat(600));
        assert!(wide.len() > 1000);
        assert!(parse_cookies(&wide, 1000).is_ok());
    }

    #[test]
    fn test_header_cap_and_first_wins() {
        let mut headers = HeaderMap::new();
        headers.append("x-dup", HeaderValue::from_static("first"));
        headers.append("x-dup", HeaderValue::from_static("second"));
        for i in 0..60 {
            headers.insert(
                axum::http::HeaderName::try_from(format!("x-h{i}")).unwrap(),
                HeaderValue::from_static("v"),
            );
        }

        let collected = collect_headers(&headers, 50);
        assert!(collected.len() <= 50);
        assert_eq!(collected["x-dup"], "first");
    }
}
