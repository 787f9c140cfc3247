//! Per-request context.
//!
//! # Data Flow
//! ```text
//! Request + Matched route + RuntimeConfig + Env
//!     → Context::new (bind params, route options, client IP)
//!     → handlers read `req()` accessors and write `res()` state
//!     → App takes the accumulator to build the final response
//! ```
//!
//! # Design Decisions
//! - `Context` is a cheap `Clone` over an `Arc`, handed to every handler
//! - Request facts are immutable; only the accumulator is mutable
//! - Runtime capabilities are passed in, never probed

pub mod parse;
pub mod request;
pub mod response;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;

use crate::config::AppSettings;
use crate::handler::RouteOptions;
use crate::http::{Payload, Request};
use crate::runtime::{Env, Runtime};

pub use request::{BodyOptions, RequestContext, DEFAULT_READ_DEADLINE};
pub use response::{Accumulator, CookieOptions, ResponseContext, SameSite};

/// Bounds applied to request input.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub body_deadline: Duration,
    pub max_body_bytes: usize,
    pub max_headers: usize,
    pub max_cookie_header: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&AppSettings::default())
    }
}

impl From<&AppSettings> for Limits {
    fn from(settings: &AppSettings) -> Self {
        Self {
            body_deadline: Duration::from_millis(settings.body_deadline_ms),
            max_body_bytes: settings.max_body_bytes,
            max_headers: settings.max_headers,
            max_cookie_header: settings.max_cookie_header,
        }
    }
}

struct Inner {
    req: RequestContext,
    res: ResponseContext,
    runtime: Runtime,
    env: Env,
}

/// Per-request facade handed to handlers and post-dispatch extensions.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

/// Everything needed to build a [`Context`].
pub(crate) struct ContextParts {
    pub request: Arc<Request>,
    pub params: HashMap<String, String>,
    pub options: Option<Arc<RouteOptions>>,
    pub limits: Limits,
    pub ip: Option<String>,
    pub runtime: Runtime,
    pub env: Env,
    pub response: ResponseContext,
}

impl Context {
    pub(crate) fn new(parts: ContextParts) -> Self {
        let req = RequestContext::new(
            parts.request,
            parts.params,
            parts.options,
            parts.limits,
            parts.ip,
        );
        Self {
            inner: Arc::new(Inner {
                req,
                res: parts.response,
                runtime: parts.runtime,
                env: parts.env,
            }),
        }
    }

    /// Request side: validated accessors and raw readers.
    pub fn req(&self) -> &RequestContext {
        &self.inner.req
    }

    /// Response side: status, headers, cookies, body.
    pub fn res(&self) -> &ResponseContext {
        &self.inner.res
    }

    pub fn runtime(&self) -> Runtime {
        self.inner.runtime
    }

    pub fn ip(&self) -> Option<&str> {
        self.inner.req.ip()
    }

    pub fn method(&self) -> &Method {
        self.inner.req.method()
    }

    pub fn raw(&self) -> &Request {
        self.inner.req.raw()
    }

    /// Look up an environment variable.
    ///
    /// Edge bindings on the edge runtime, process environment on the server.
    pub fn env(&self, name: &str) -> Option<String> {
        match self.inner.runtime {
            Runtime::Edge => self.inner.env.bindings.get(name).cloned(),
            Runtime::Server => std::env::var(name).ok(),
        }
    }

    /// Schedule work to finish after the response has been sent.
    pub fn wait_until<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.env.defer(work);
    }

    /// Shortcut for `res().set_body(..)`.
    pub fn respond(&self, body: impl Into<Payload>) {
        self.inner.res.set_body(body);
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", self.method())
            .field("path", &self.inner.req.path())
            .field("runtime", &self.inner.runtime)
            .finish()
    }
}
