//! Request side of the context: validated, memoized accessors.
//!
//! # Responsibilities
//! - Validate params, query, headers, cookies and body against route schemas
//! - Compute each validated view at most once per request
//! - Offer best-effort raw body readers that never fail the request
//!
//! # Design Decisions
//! - Validated accessors fail loudly (`BadRequest` / `ContentTooLarge`)
//! - Raw readers return `None` on any failure
//! - A cached failure is replayed on later reads, not recomputed

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::context::parse::{self, CookieError};
use crate::context::Limits;
use crate::error::{Error, Rejection};
use crate::handler::RouteOptions;
use crate::http::request::{parse_form, read_body, ReadError};
use crate::http::{Blob, FormData, Request};
use crate::schema::{Schema, Shape};

/// Deadline used by raw readers when the caller passes `None`.
pub const DEFAULT_READ_DEADLINE: Duration = Duration::from_millis(2500);

/// Options for [`RequestContext::body_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyOptions {
    /// Flatten `multipart/form-data` into a plain object before validation.
    pub transform: bool,
}

/// Validated views over the incoming request.
#[derive(Debug)]
pub struct RequestContext {
    request: Arc<Request>,
    params: HashMap<String, String>,
    options: Option<Arc<RouteOptions>>,
    limits: Limits,
    ip: Option<String>,
    query: OnceLock<Result<Arc<Map<String, Value>>, Rejection>>,
    headers: OnceLock<Result<Arc<HashMap<String, String>>, Rejection>>,
    cookies: OnceLock<Result<Arc<HashMap<String, String>>, Rejection>>,
    body: OnceCell<Result<Option<Value>, Rejection>>,
}

impl RequestContext {
    pub(crate) fn new(
        request: Arc<Request>,
        params: HashMap<String, String>,
        options: Option<Arc<RouteOptions>>,
        limits: Limits,
        ip: Option<String>,
    ) -> Self {
        Self {
            request,
            params,
            options,
            limits,
            ip,
            query: OnceLock::new(),
            headers: OnceLock::new(),
            cookies: OnceLock::new(),
            body: OnceCell::new(),
        }
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    /// The underlying request.
    pub fn raw(&self) -> &Request {
        &self.request
    }

    pub fn path(&self) -> &str {
        self.request.path()
    }

    /// Raw captured value of a path parameter.
    pub fn param_raw(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// All raw captured path parameters.
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// A path parameter, validated when the route declares a schema for it.
    ///
    /// Without a schema the raw string is returned, or `null` when absent.
    pub fn param(&self, name: &str) -> Result<Value, Error> {
        let raw = self
            .params
            .get(name)
            .map(|v| Value::String(v.clone()))
            .unwrap_or(Value::Null);

        match self.options.as_ref().and_then(|o| o.params.get(name)) {
            Some(schema) => schema.safe_parse(raw).map_err(|err| {
                tracing::warn!(param = %name, error = %err, "Path parameter rejected");
                Error::BadRequest
            }),
            None => Ok(raw),
        }
    }

    /// The query string as a coerced mapping.
    pub fn query(&self) -> Result<Arc<Map<String, Value>>, Error> {
        self.query
            .get_or_init(|| {
                let parsed = parse::parse_query(self.request.query().unwrap_or_default());
                let Some(schema) = self.schema(|o| &o.query) else {
                    return Ok(Arc::new(parsed));
                };
                match schema.safe_parse(Value::Object(parsed)) {
                    Ok(Value::Object(validated)) => Ok(Arc::new(validated)),
                    Ok(_) => Err(Rejection::BadRequest),
                    Err(err) => {
                        tracing::warn!(error = %err, "Query rejected");
                        Err(Rejection::BadRequest)
                    }
                }
            })
            .clone()
            .map_err(Error::from)
    }

    /// Up to `max_headers` request headers, lowercase keys, first value wins.
    pub fn headers(&self) -> Result<Arc<HashMap<String, String>>, Error> {
        self.headers
            .get_or_init(|| {
                let headers = parse::collect_headers(self.request.headers(), self.limits.max_headers);
                self.validate_map("headers", headers, |o| &o.headers)
            })
            .clone()
            .map_err(Error::from)
    }

    /// Cookies from the first `cookie` header.
    ///
    /// An oversized header is `ContentTooLarge`; an unreadable one is treated
    /// as empty.
    pub fn cookies(&self) -> Result<Arc<HashMap<String, String>>, Error> {
        self.cookies
            .get_or_init(|| {
                let header = match self.request.headers().get(header::COOKIE) {
                    Some(value) => value.to_str().unwrap_or_default(),
                    None => "",
                };
                let cookies = match parse::parse_cookies(header, self.limits.max_cookie_header) {
                    Ok(cookies) => cookies,
                    Err(CookieError::TooLong) => {
                        tracing::warn!(length = header.len(), "Cookie header too long");
                        return Err(Rejection::ContentTooLarge);
                    }
                };
                self.validate_map("cookies", cookies, |o| &o.cookies)
            })
            .clone()
            .map_err(Error::from)
    }

    /// The validated body, or `None` when the route declares no body schema.
    pub async fn body(&self) -> Result<Option<Value>, Error> {
        self.body_with(BodyOptions::default()).await
    }

    /// Like [`body`](Self::body), with per-call options.
    ///
    /// The first read is memoized; options of later calls are ignored.
    pub async fn body_with(&self, options: BodyOptions) -> Result<Option<Value>, Error> {
        self.body
            .get_or_init(|| self.read_validated_body(options))
            .await
            .clone()
            .map_err(Error::from)
    }

    /// The validated body deserialized into `T`.
    pub async fn body_as<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let value = self.body().await?.unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|err| {
            tracing::warn!(error = %err, "Body does not fit target type");
            Error::BadRequest
        })
    }

    async fn read_validated_body(&self, options: BodyOptions) -> Result<Option<Value>, Rejection> {
        let Some(schema) = self.schema(|o| &o.body) else {
            return Ok(None);
        };

        let value = self.read_body_value(schema.shape(), options).await.map_err(|err| {
            tracing::warn!(error = ?err, "Body read failed");
            match err {
                ReadError::Deadline | ReadError::TooLarge => Rejection::ContentTooLarge,
                ReadError::Consumed | ReadError::Malformed => Rejection::BadRequest,
            }
        })?;

        schema.safe_parse(value).map(Some).map_err(|err| {
            tracing::warn!(error = %err, "Body rejected");
            Rejection::BadRequest
        })
    }

    async fn read_body_value(&self, shape: Shape, options: BodyOptions) -> Result<Value, ReadError> {
        let body = self.request.take_body().ok_or(ReadError::Consumed)?;
        let bytes = read_body(body, self.limits.max_body_bytes, self.limits.body_deadline).await?;

        match shape {
            Shape::Text => String::from_utf8(bytes.to_vec())
                .map(Value::String)
                .map_err(|_| ReadError::Malformed),
            Shape::Structured if self.transforms(options) => {
                let form = parse_form(self.request.content_type(), bytes).await?;
                Ok(Value::Object(form.to_json_map()))
            }
            Shape::Structured => serde_json::from_slice(&bytes).map_err(|_| ReadError::Malformed),
        }
    }

    fn transforms(&self, options: BodyOptions) -> bool {
        let enabled = options.transform || self.options.as_ref().is_some_and(|o| o.transform);
        enabled && self.request.is_multipart()
    }

    fn schema(
        &self,
        pick: impl FnOnce(&RouteOptions) -> &Option<Arc<dyn Schema>>,
    ) -> Option<Arc<dyn Schema>> {
        self.options.as_deref().and_then(|o| pick(o).clone())
    }

    fn validate_map(
        &self,
        what: &'static str,
        map: HashMap<String, String>,
        pick: impl FnOnce(&RouteOptions) -> &Option<Arc<dyn Schema>>,
    ) -> Result<Arc<HashMap<String, String>>, Rejection> {
        if let Some(schema) = self.schema(pick) {
            if let Err(err) = schema.safe_parse(parse::to_object(&map)) {
                tracing::warn!(accessor = what, error = %err, "Validation failed");
                return Err(Rejection::BadRequest);
            }
        }
        Ok(Arc::new(map))
    }

    async fn read_raw(&self, deadline: Option<Duration>) -> Option<Bytes> {
        let body = self.request.take_body()?;
        read_body(
            body,
            self.limits.max_body_bytes,
            deadline.unwrap_or(DEFAULT_READ_DEADLINE),
        )
        .await
        .ok()
    }

    /// Body as a blob carrying the request content type.
    pub async fn blob(&self, deadline: Option<Duration>) -> Option<Blob> {
        let bytes = self.read_raw(deadline).await?;
        Some(Blob::new(bytes, self.request.content_type().map(str::to_owned)))
    }

    /// Body as raw bytes.
    pub async fn buffer(&self, deadline: Option<Duration>) -> Option<Bytes> {
        self.read_raw(deadline).await
    }

    /// Body as form data (multipart or urlencoded).
    pub async fn form_data(&self, deadline: Option<Duration>) -> Option<FormData> {
        let bytes = self.read_raw(deadline).await?;
        parse_form(self.request.content_type(), bytes).await.ok()
    }

    /// Body as UTF-8 text.
    pub async fn text(&self, deadline: Option<Duration>) -> Option<String> {
        let bytes = self.read_raw(deadline).await?;
        String::from_utf8(bytes.to_vec()).ok()
    }

    /// Body as JSON.
    pub async fn json(&self, deadline: Option<Duration>) -> Option<Value> {
        let bytes = self.read_raw(deadline).await?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Take the unread body stream.
    pub fn stream(&self) -> Option<Body> {
        self.request.take_body()
    }
}
