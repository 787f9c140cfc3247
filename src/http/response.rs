//! Response normalization and finalization.
//!
//! # Responsibilities
//! - Apply per-payload serialization rules (length, default content type)
//! - Strip cache headers from non-cacheable statuses
//! - Build the outbound response, bodyless for redirects
//! - Answer CORS preflights and drop bodies for `HEAD`
//!
//! # Design Decisions
//! - Normalization writes back into the accumulator so post-dispatch
//!   extensions see the final headers
//! - Streams and multipart bodies carry no length
//! - A JSON `code` field becomes the status

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use serde_json::Value;

use crate::context::Accumulator;
use crate::handler::CacheOption;
use crate::http::{Payload, Request, Response};
use crate::runtime::CachedResponse;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json; charset=utf-8";
const NO_STORE: &str = "max-age=0, private, must-revalidate";
const PREFLIGHT_MAX_AGE: &str = "600";

/// Headers every routed response starts with.
///
/// `cors` is the effective allowed origin (route over app). GET responses get
/// a `cache-control` derived from the app cache `max_age`, unless the route
/// overrides it.
pub fn route_defaults(
    method: &Method,
    cors: Option<&str>,
    cache_max_age: Option<u64>,
    route_cache: Option<CacheOption>,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(value) = cors.and_then(|origin| HeaderValue::from_str(origin).ok()) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }

    if *method == Method::GET {
        let max_age = match route_cache {
            Some(CacheOption::Disabled) => None,
            Some(CacheOption::MaxAge(seconds)) => Some(seconds),
            None => cache_max_age,
        };
        let value = match max_age.filter(|seconds| *seconds > 0) {
            Some(seconds) => HeaderValue::from_str(&format!("max-age={seconds}")),
            None => Ok(HeaderValue::from_static(NO_STORE)),
        };
        if let Ok(value) = value {
            headers.insert(header::CACHE_CONTROL, value);
        }
    }

    headers
}

/// Apply serialization rules to the accumulated body.
pub fn normalize(acc: &mut Accumulator) {
    if acc.code != StatusCode::OK && acc.code != StatusCode::MOVED_PERMANENTLY {
        acc.headers.remove(header::CACHE_CONTROL);
    }

    if acc.headers.contains_key(header::LOCATION) {
        return;
    }

    let Some(body) = acc.body.take() else {
        return;
    };

    let body = match body {
        Payload::Text(text) => {
            set_length(&mut acc.headers, text.len());
            default_type(&mut acc.headers, TEXT_PLAIN);
            Payload::Text(text)
        }
        Payload::Bytes(bytes) => {
            set_length(&mut acc.headers, bytes.len());
            Payload::Bytes(bytes)
        }
        Payload::Blob(blob) => {
            set_length(&mut acc.headers, blob.size());
            if let Some(value) = blob.content_type().and_then(|ct| HeaderValue::from_str(ct).ok()) {
                acc.headers.entry(header::CONTENT_TYPE).or_insert(value);
            }
            Payload::Blob(blob)
        }
        Payload::Form(form) => Payload::Bytes(encode_form(&mut acc.headers, &form)),
        Payload::Stream(stream) => Payload::Stream(stream),
        Payload::Json(value) => {
            if let Some(code) = adopted_code(&value) {
                acc.code = code;
            }
            let text = value.to_string();
            set_length(&mut acc.headers, text.len());
            default_type(&mut acc.headers, APPLICATION_JSON);
            Payload::Text(text)
        }
    };

    acc.body = Some(body);
}

/// Re-apply [`normalize`] after the body was replaced.
///
/// `stale_type` is the content type derived from the previous body. It is
/// dropped unless something else has been set since; the length is always
/// recomputed.
pub fn renormalize(acc: &mut Accumulator, stale_type: Option<&HeaderValue>) {
    if stale_type.is_some() && acc.headers.get(header::CONTENT_TYPE) == stale_type {
        acc.headers.remove(header::CONTENT_TYPE);
    }
    acc.headers.remove(header::CONTENT_LENGTH);
    normalize(acc);
}

fn adopted_code(value: &Value) -> Option<StatusCode> {
    let code = value.get("code")?.as_u64()?;
    let code = u16::try_from(code).ok()?;
    StatusCode::from_u16(code).ok()
}

fn set_length(headers: &mut HeaderMap, length: usize) {
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
}

fn default_type(headers: &mut HeaderMap, content_type: &'static str) {
    headers
        .entry(header::CONTENT_TYPE)
        .or_insert(HeaderValue::from_static(content_type));
}

fn encode_form(headers: &mut HeaderMap, form: &crate::http::FormData) -> Bytes {
    let boundary = format!("velox-{}", uuid::Uuid::new_v4().simple());
    if let Ok(value) = HeaderValue::from_str(&format!("multipart/form-data; boundary={boundary}")) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    form.encode_multipart(&boundary)
}

/// Build the outbound response from the accumulator.
///
/// With `keep_copy`, buffered bodies are also returned as a cacheable copy.
/// Streamed bodies are never copied.
pub fn finalize(acc: Accumulator, keep_copy: bool) -> (Response, Option<CachedResponse>) {
    let Accumulator {
        body,
        code,
        mut headers,
    } = acc;

    let body = if headers.contains_key(header::LOCATION) {
        None
    } else {
        body
    };

    let buffered = matches!(&body, Some(payload) if !matches!(payload, Payload::Stream(_)));

    let (body, copy) = match body {
        None => (Body::empty(), Some(Bytes::new())),
        Some(Payload::Text(text)) => {
            let bytes = Bytes::from(text);
            (Body::from(bytes.clone()), Some(bytes))
        }
        Some(Payload::Bytes(bytes)) => (Body::from(bytes.clone()), Some(bytes)),
        Some(Payload::Blob(blob)) => {
            let bytes = blob.into_bytes();
            (Body::from(bytes.clone()), Some(bytes))
        }
        Some(Payload::Form(form)) => {
            let bytes = encode_form(&mut headers, &form);
            (Body::from(bytes.clone()), Some(bytes))
        }
        Some(Payload::Json(value)) => {
            let bytes = Bytes::from(value.to_string());
            (Body::from(bytes.clone()), Some(bytes))
        }
        Some(Payload::Stream(stream)) => (Body::from_stream(stream), None),
    };

    if let Some(bytes) = copy.as_ref().filter(|_| buffered) {
        set_length(&mut headers, bytes.len());
    }

    let cached = match copy {
        Some(bytes) if keep_copy => Some(CachedResponse {
            status: code,
            headers: headers.clone(),
            body: bytes,
        }),
        _ => None,
    };

    let mut response = Response::new(body);
    *response.status_mut() = code;
    *response.headers_mut() = headers;
    (response, cached)
}

/// Drop the body, keeping status and headers.
pub fn strip_body(response: Response) -> Response {
    let (parts, _) = response.into_parts();
    Response::from_parts(parts, Body::empty())
}

/// Whether the request is a CORS preflight.
pub fn is_preflight(request: &Request) -> bool {
    request.method() == Method::OPTIONS
        && request.headers().contains_key(header::ORIGIN)
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

/// The 204 answer to a CORS preflight.
pub fn preflight(request: &Request, cors: Option<&str>) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;

    let headers = response.headers_mut();
    if let Some(value) = cors.and_then(|origin| HeaderValue::from_str(origin).ok()) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("*"),
    );
    let allow_headers = request
        .headers()
        .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or(HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("false"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(PREFLIGHT_MAX_AGE),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Blob, FormData};
    use serde_json::json;

    fn acc(body: Option<Payload>, code: StatusCode) -> Accumulator {
        Accumulator {
            body,
            code,
            headers: HeaderMap::new(),
        }
    }

    #[test]
    fn test_text_body() {
        let mut acc = acc(Some(Payload::from("hello")), StatusCode::OK);
        normalize(&mut acc);
        assert_eq!(acc.headers[header::CONTENT_LENGTH], "5");
        assert_eq!(acc.headers[header::CONTENT_TYPE], TEXT_PLAIN);
    }

    #[test]
    fn test_explicit_content_type_is_kept() {
        let mut acc = acc(Some(Payload::from("<p>hi</p>")), StatusCode::OK);
        acc.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        normalize(&mut acc);
        assert_eq!(acc.headers[header::CONTENT_TYPE], "text/html");
    }

    #[test]
    fn test_bytes_and_blob_lengths() {
        let mut bytes = acc(Some(Payload::from(vec![1u8, 2, 3])), StatusCode::OK);
        normalize(&mut bytes);
        assert_eq!(bytes.headers[header::CONTENT_LENGTH], "3");
        assert!(bytes.headers.get(header::CONTENT_TYPE).is_none());

        let blob = Blob::new(&b"abcd"[..], Some("image/png".into()));
        let mut blob = acc(Some(Payload::from(blob)), StatusCode::OK);
        normalize(&mut blob);
        assert_eq!(blob.headers[header::CONTENT_LENGTH], "4");
        assert_eq!(blob.headers[header::CONTENT_TYPE], "image/png");
    }

    #[test]
    fn test_renormalize_after_body_swap() {
        let mut acc = acc(Some(Payload::from("hello")), StatusCode::OK);
        normalize(&mut acc);
        let stale = acc.headers.get(header::CONTENT_TYPE).cloned();

        acc.body = Some(Payload::from(json!({"wrapped": "hello world"})));
        renormalize(&mut acc, stale.as_ref());

        assert_eq!(acc.headers[header::CONTENT_LENGTH], "25");
        assert!(acc.headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/json"));
    }

    #[test]
    fn test_renormalize_keeps_type_set_since() {
        let mut acc = acc(Some(Payload::from("hello")), StatusCode::OK);
        normalize(&mut acc);
        let stale = acc.headers.get(header::CONTENT_TYPE).cloned();

        acc.body = Some(Payload::from("<p>hello</p>"));
        acc.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        renormalize(&mut acc, stale.as_ref());

        assert_eq!(acc.headers[header::CONTENT_TYPE], "text/html");
        assert_eq!(acc.headers[header::CONTENT_LENGTH], "12");
    }

    #[test]
    fn test_finalize_length_follows_bytes() {
        let mut acc = acc(Some(Payload::from("hello")), StatusCode::OK);
        normalize(&mut acc);
        acc.body = Some(Payload::from("hello world"));

        let (response, copy) = finalize(acc, true);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "11");
        assert_eq!(copy.unwrap().body, Bytes::from_static(b"hello world"));
    }

    #[test]
    fn test_json_adopts_code() {
        let mut acc = acc(Some(Payload::Json(json!({"code": 418, "ok": false}))), StatusCode::OK);
        normalize(&mut acc);
        assert_eq!(acc.code, StatusCode::IM_A_TEAPOT);
        assert_eq!(acc.headers[header::CONTENT_TYPE], APPLICATION_JSON);
        assert!(matches!(acc.body, Some(Payload::Text(_))));
    }

    #[test]
    fn test_form_has_boundary_and_no_length() {
        let mut form = FormData::new();
        form.append("a", "1");
        let mut acc = acc(Some(Payload::from(form)), StatusCode::OK);
        normalize(&mut acc);
        let content_type = acc.headers[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        assert!(acc.headers.get(header::CONTENT_LENGTH).is_none());
    }

    #[test]
    fn test_cache_control_stripped_for_errors() {
        let mut acc = acc(None, StatusCode::NOT_FOUND);
        acc.headers
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=60"));
        normalize(&mut acc);
        assert!(acc.headers.get(header::CACHE_CONTROL).is_none());
    }

    #[test]
    fn test_location_makes_response_bodyless() {
        let mut acc = acc(Some(Payload::from("ignored")), StatusCode::TEMPORARY_REDIRECT);
        acc.headers
            .insert(header::LOCATION, HeaderValue::from_static("/elsewhere"));
        normalize(&mut acc);
        assert!(acc.headers.get(header::CONTENT_LENGTH).is_none());

        let (response, cached) = finalize(acc, true);
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert!(cached.unwrap().body.is_empty());
    }

    #[test]
    fn test_route_defaults() {
        let get = route_defaults(&Method::GET, Some("*"), None, None);
        assert_eq!(get[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(get[header::CACHE_CONTROL], NO_STORE);

        let cached = route_defaults(&Method::GET, None, Some(60), None);
        assert_eq!(cached[header::CACHE_CONTROL], "max-age=60");

        let disabled = route_defaults(&Method::GET, None, Some(60), Some(CacheOption::Disabled));
        assert_eq!(disabled[header::CACHE_CONTROL], NO_STORE);

        let post = route_defaults(&Method::POST, None, Some(60), None);
        assert!(post.get(header::CACHE_CONTROL).is_none());
    }

    #[test]
    fn test_preflight_headers() {
        let request = Request::new(
            axum::http::Request::builder()
                .method(Method::OPTIONS)
                .header("origin", "https://a.example")
                .header("access-control-request-method", "POST")
                .header("access-control-request-headers", "x-custom")
                .body(Body::empty())
                .unwrap(),
        );
        assert!(is_preflight(&request));

        let response = preflight(&request, Some("https://a.example"));
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://a.example");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "x-custom");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "false");
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "600");
    }
}
