//! Incoming request abstraction.
//!
//! # Responsibilities
//! - Hold the immutable request head (method, URI, headers)
//! - Hand out the body at most once
//! - Read bodies under a deadline and a size bound
//! - Parse form bodies (multipart and urlencoded)
//!
//! # Design Decisions
//! - The body sits behind a mutex so a shared `&Request` can still consume it
//! - A deadline miss is distinct from a parse failure

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{FromRequest, Multipart};
use axum::http::{self, header, HeaderMap, Method, Uri};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

use crate::http::payload::{FormData, FormValue};

/// Header used to propagate request IDs.
pub const X_REQUEST_ID: &str = "x-request-id";

/// An incoming request whose body can be read once.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Mutex<Option<Body>>,
}

impl Request {
    pub fn new(request: http::Request<Body>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body: Mutex::new(Some(body)),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// URL path, never empty.
    pub fn path(&self) -> &str {
        match self.uri.path() {
            "" => "/",
            path => path,
        }
    }

    /// Raw query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// First value of a header, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    /// Whether the body is declared as `multipart/form-data`.
    pub fn is_multipart(&self) -> bool {
        self.content_type()
            .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
            .unwrap_or(false)
    }

    /// Full URL used to identify this request, e.g. in a response cache.
    pub fn url(&self) -> String {
        if self.uri.authority().is_some() {
            return self.uri.to_string();
        }
        let host = self.header(header::HOST.as_str()).unwrap_or("localhost");
        let path_and_query = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("http://{host}{path_and_query}")
    }

    /// Take the body. Returns `None` once it has been consumed.
    pub fn take_body(&self) -> Option<Body> {
        self.body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Whether the body is still unread.
    pub fn body_available(&self) -> bool {
        self.body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Why a body read failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// The body was already consumed.
    Consumed,
    /// The deadline elapsed first.
    Deadline,
    /// The body exceeded the size bound.
    TooLarge,
    /// Transport failure or undecodable content.
    Malformed,
}

/// Read a body into memory, failing past `limit` bytes or after `deadline`.
pub async fn read_body(body: Body, limit: usize, deadline: Duration) -> Result<Bytes, ReadError> {
    match tokio::time::timeout(deadline, collect(body, limit)).await {
        Ok(result) => result,
        Err(_) => Err(ReadError::Deadline),
    }
}

async fn collect(body: Body, limit: usize) -> Result<Bytes, ReadError> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|_| ReadError::Malformed)?;
        if buf.len() + chunk.len() > limit {
            return Err(ReadError::TooLarge);
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(buf.freeze())
}

/// Parse an in-memory form body according to its content type.
///
/// Supports `multipart/form-data` and `application/x-www-form-urlencoded`.
pub async fn parse_form(content_type: Option<&str>, bytes: Bytes) -> Result<FormData, ReadError> {
    let content_type = content_type.ok_or(ReadError::Malformed)?;
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "application/x-www-form-urlencoded" => {
            let mut form = FormData::new();
            for (key, value) in url::form_urlencoded::parse(&bytes) {
                form.append(key.into_owned(), value.into_owned());
            }
            Ok(form)
        }
        "multipart/form-data" => parse_multipart(content_type, bytes).await,
        _ => Err(ReadError::Malformed),
    }
}

async fn parse_multipart(content_type: &str, bytes: Bytes) -> Result<FormData, ReadError> {
    let request = http::Request::builder()
        .method(Method::POST)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(bytes))
        .map_err(|_| ReadError::Malformed)?;

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|_| ReadError::Malformed)?;

    let mut form = FormData::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ReadError::Malformed)?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        let filename = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await.map_err(|_| ReadError::Malformed)?;

        let value = match filename {
            Some(filename) => FormValue::File {
                filename: Some(filename),
                content_type,
                bytes,
            },
            None => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => FormValue::Text(text),
                Err(_) => FormValue::File {
                    filename: None,
                    content_type,
                    bytes,
                },
            },
        };
        form.push(name, value);
    }

    Ok(form)
}
