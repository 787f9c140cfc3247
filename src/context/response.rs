//! Mutable response accumulator.
//!
//! # Responsibilities
//! - Hold the `{ body, code, headers }` triple built during handling
//! - Expose status, header, cookie and redirect setters
//!
//! # Design Decisions
//! - One request owns the accumulator; the mutex only satisfies `Sync`
//!   and is never held across an `.await`
//! - A poisoned lock is recovered; the data is plain values

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::http::Payload;

/// The `{ body, code, headers }` triple.
#[derive(Debug)]
pub struct Accumulator {
    pub body: Option<Payload>,
    pub code: StatusCode,
    pub headers: HeaderMap,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            body: None,
            code: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attributes of a `set-cookie` header.
#[derive(Debug, Clone, Default)]
pub struct CookieOptions {
    pub expires_at: Option<DateTime<Utc>>,
    pub max_age: Option<u64>,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

/// Format a `set-cookie` value.
pub fn format_cookie(name: &str, value: &str, options: &CookieOptions) -> String {
    let mut cookie = format!("{name}={value};");

    if let Some(expires_at) = options.expires_at {
        cookie.push_str(&format!(
            " expires={};",
            expires_at.format("%a, %d %b %Y %H:%M:%S GMT")
        ));
    }
    if let Some(max_age) = options.max_age.filter(|age| *age > 0) {
        cookie.push_str(&format!(" max-age={max_age};"));
    }
    if let Some(domain) = options.domain.as_deref().filter(|d| !d.is_empty()) {
        cookie.push_str(&format!(" domain={domain};"));
    }
    if let Some(path) = options.path.as_deref().filter(|p| !p.is_empty()) {
        cookie.push_str(&format!(" path={path};"));
    }
    if options.secure {
        cookie.push_str(" secure;");
    }
    if options.http_only {
        cookie.push_str(" httpOnly;");
    }
    if let Some(same_site) = options.same_site {
        cookie.push_str(&format!(" sameSite={};", same_site.as_str()));
    }

    cookie
}

/// Response side of the context.
#[derive(Debug, Default)]
pub struct ResponseContext {
    inner: Mutex<Accumulator>,
    revision: AtomicU64,
}

impl ResponseContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_headers(headers: HeaderMap) -> Self {
        Self {
            inner: Mutex::new(Accumulator {
                headers,
                ..Accumulator::default()
            }),
            revision: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Accumulator> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the status code.
    pub fn code(&self, code: StatusCode) {
        self.lock().code = code;
    }

    pub fn status(&self) -> StatusCode {
        self.lock().code
    }

    /// Set a header, or delete it when `value` is `None`.
    pub fn header(&self, name: &str, value: Option<&str>) -> Result<(), Error> {
        let name = HeaderName::try_from(name)?;
        let mut acc = self.lock();
        match value {
            Some(value) => {
                acc.headers.insert(name, HeaderValue::try_from(value)?);
            }
            None => {
                acc.headers.remove(name);
            }
        }
        Ok(())
    }

    /// Add a header value without replacing existing ones.
    pub fn append_header(&self, name: &str, value: &str) -> Result<(), Error> {
        let name = HeaderName::try_from(name)?;
        let value = HeaderValue::try_from(value)?;
        self.lock().headers.append(name, value);
        Ok(())
    }

    /// First value of a response header.
    pub fn get_header(&self, name: &str) -> Option<String> {
        self.lock()
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    /// Attach a cookie.
    pub fn cookie(&self, name: &str, value: &str, options: CookieOptions) -> Result<(), Error> {
        let cookie = HeaderValue::try_from(format_cookie(name, value, &options))?;
        self.lock().headers.append(header::SET_COOKIE, cookie);
        Ok(())
    }

    /// Redirect to `destination` with `code` (307 when `None`).
    pub fn redirect(&self, destination: &str, code: Option<StatusCode>) -> Result<(), Error> {
        let location = HeaderValue::try_from(destination)?;
        let mut acc = self.lock();
        acc.code = code.unwrap_or(StatusCode::TEMPORARY_REDIRECT);
        acc.headers.insert(header::LOCATION, location);
        Ok(())
    }

    /// Replace the body.
    pub fn set_body(&self, body: impl Into<Payload>) {
        self.lock().body = Some(body.into());
        self.revision.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove and return the body.
    pub fn take_body(&self) -> Option<Payload> {
        self.revision.fetch_add(1, Ordering::Relaxed);
        self.lock().body.take()
    }

    /// Bumped on every `set_body`/`take_body`.
    pub(crate) fn body_revision(&self) -> u64 {
        self.revision.load(Ordering::Relaxed)
    }

    pub fn has_body(&self) -> bool {
        self.lock().body.is_some()
    }

    /// Run `f` against the accumulator.
    pub fn with<R>(&self, f: impl FnOnce(&mut Accumulator) -> R) -> R {
        f(&mut self.lock())
    }

    /// Move the accumulated state out, leaving defaults behind.
    pub(crate) fn take(&self) -> Accumulator {
        std::mem::take(&mut *self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cookie_format() {
        let options = CookieOptions {
            expires_at: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            max_age: Some(60),
            domain: Some("example.com".into()),
            path: Some("/".into()),
            secure: true,
            http_only: true,
            same_site: Some(SameSite::Lax),
        };
        assert_eq!(
            format_cookie("session", "abc", &options),
            "session=abc; expires=Tue, 02 Jan 2024 03:04:05 GMT; max-age=60; domain=example.com; path=/; secure; httpOnly; sameSite=Lax;"
        );
        assert_eq!(format_cookie("a", "b", &CookieOptions::default()), "a=b;");
    }

    #[test]
    fn test_header_set_and_delete() {
        let res = ResponseContext::new();
        res.header("x-test", Some("1")).unwrap();
        assert_eq!(res.get_header("x-test").as_deref(), Some("1"));
        res.header("x-test", None).unwrap();
        assert!(res.get_header("x-test").is_none());
        assert!(res.header("bad header", Some("1")).is_err());
    }

    #[test]
    fn test_redirect_defaults_to_307() {
        let res = ResponseContext::new();
        res.redirect("https://example.com", None).unwrap();
        assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(res.get_header("location").as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_cookies_append() {
        let res = ResponseContext::new();
        res.cookie("a", "1", CookieOptions::default()).unwrap();
        res.cookie("b", "2", CookieOptions::default()).unwrap();
        let count = res.with(|acc| acc.headers.get_all(header::SET_COOKIE).iter().count());
        assert_eq!(count, 2);
    }
}
