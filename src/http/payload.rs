//! Response and form payloads.
//!
//! # Design Decisions
//! - One tagged variant per body kind; serialization rules live in
//!   `http::response`, not here
//! - Form data keeps insertion order and duplicate names

use std::fmt;
use std::pin::Pin;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::Stream;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{BoxError, Error};

/// A streamed body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Binary data with an optional media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    bytes: Bytes,
    content_type: Option<String>,
}

impl Blob {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// A single form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    File {
        filename: Option<String>,
        content_type: Option<String>,
        bytes: Bytes,
    },
}

impl FormValue {
    /// Plain JSON rendition used when form data is flattened into an object.
    ///
    /// Files become `{ "filename", "type", "size" }` descriptors.
    pub fn to_json(&self) -> Value {
        match self {
            FormValue::Text(text) => Value::String(text.clone()),
            FormValue::File {
                filename,
                content_type,
                bytes,
            } => serde_json::json!({
                "filename": filename,
                "type": content_type,
                "size": bytes.len(),
            }),
        }
    }
}

/// Ordered form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    entries: Vec<(String, FormValue)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text field.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries
            .push((name.into(), FormValue::Text(value.into())));
    }

    /// Append a file field.
    pub fn append_file(
        &mut self,
        name: impl Into<String>,
        filename: Option<String>,
        content_type: Option<String>,
        bytes: impl Into<Bytes>,
    ) {
        self.entries.push((
            name.into(),
            FormValue::File {
                filename,
                content_type,
                bytes: bytes.into(),
            },
        ));
    }

    pub(crate) fn push(&mut self, name: String, value: FormValue) {
        self.entries.push((name, value));
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flatten into a plain mapping. Later duplicates overwrite earlier ones.
    pub fn to_json_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (key, value) in &self.entries {
            map.insert(key.clone(), value.to_json());
        }
        map
    }

    /// Encode as a `multipart/form-data` body using `boundary`.
    pub fn encode_multipart(&self, boundary: &str) -> Bytes {
        let mut out = BytesMut::new();
        for (name, value) in &self.entries {
            out.put_slice(format!("--{boundary}\r\n").as_bytes());
            match value {
                FormValue::Text(text) => {
                    out.put_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    out.put_slice(text.as_bytes());
                }
                FormValue::File {
                    filename,
                    content_type,
                    bytes,
                } => {
                    let filename = filename.as_deref().unwrap_or("blob");
                    out.put_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                        )
                        .as_bytes(),
                    );
                    let content_type = content_type
                        .as_deref()
                        .unwrap_or("application/octet-stream");
                    out.put_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
                    out.put_slice(bytes);
                }
            }
            out.put_slice(b"\r\n");
        }
        out.put_slice(format!("--{boundary}--\r\n").as_bytes());
        out.freeze()
    }
}

/// A response body.
pub enum Payload {
    Text(String),
    Bytes(Bytes),
    Blob(Blob),
    Form(FormData),
    Stream(BodyStream),
    Json(Value),
}

impl Payload {
    /// Serialize any value as a JSON payload.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, Error> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    /// Whether this payload counts as a body for chain short-circuiting.
    ///
    /// Empty text and falsy JSON scalars (`null`, `false`, `0`, `""`) do not.
    pub fn is_present(&self) -> bool {
        match self {
            Payload::Text(text) => !text.is_empty(),
            Payload::Json(Value::Null) | Payload::Json(Value::Bool(false)) => false,
            Payload::Json(Value::String(text)) => !text.is_empty(),
            Payload::Json(Value::Number(n)) => n.as_f64() != Some(0.0),
            _ => true,
        }
    }

    /// Kind name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Bytes(_) => "bytes",
            Payload::Blob(_) => "blob",
            Payload::Form(_) => "form",
            Payload::Stream(_) => "stream",
            Payload::Json(_) => "json",
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Payload::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Payload::Blob(blob) => f.debug_tuple("Blob").field(blob).finish(),
            Payload::Form(form) => f.debug_tuple("Form").field(form).finish(),
            Payload::Stream(_) => f.write_str("Stream(..)"),
            Payload::Json(value) => f.debug_tuple("Json").field(value).finish(),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(bytes))
    }
}

impl From<Blob> for Payload {
    fn from(blob: Blob) -> Self {
        Payload::Blob(blob)
    }
}

impl From<FormData> for Payload {
    fn from(form: FormData) -> Self {
        Payload::Form(form)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<BodyStream> for Payload {
    fn from(stream: BodyStream) -> Self {
        Payload::Stream(stream)
    }
}
