//! Route handlers and handler chains.
//!
//! # Responsibilities
//! - Define the `Handler` contract and its per-call `Outcome`
//! - Hold per-route options (validation schemas, CORS and cache overrides)
//! - Run a chain with continue/halt semantics
//!
//! # Design Decisions
//! - A handler reports `Continue` or `Halt` in its return value; there is no
//!   callback to flip
//! - The continue flag is per handler, never sticky across handlers
//! - Closures `Fn(Context) -> impl Future<Output = Result<R, Error>>` are handlers

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::context::Context;
use crate::error::Error;
use crate::http::{Blob, FormData, Payload};
use crate::schema::Schema;

/// Whether the next handler in the chain may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Let the next handler run even if a body has been set.
    Continue,
    /// Stop once a body has been set.
    #[default]
    Halt,
}

/// Result of a single handler invocation.
#[derive(Debug, Default)]
pub struct Outcome {
    pub flow: Flow,
    pub body: Option<Payload>,
}

impl Outcome {
    /// Continue to the next handler without setting a body.
    pub fn next() -> Self {
        Self {
            flow: Flow::Continue,
            body: None,
        }
    }

    /// Stop without setting a body.
    pub fn halt() -> Self {
        Self::default()
    }

    /// Set `body` and stop.
    pub fn respond(body: impl Into<Payload>) -> Self {
        Self {
            flow: Flow::Halt,
            body: Some(body.into()),
        }
    }

    /// Set `body` and let the next handler run.
    pub fn next_with(body: impl Into<Payload>) -> Self {
        Self {
            flow: Flow::Continue,
            body: Some(body.into()),
        }
    }

    pub fn into_parts(self) -> (Flow, Option<Payload>) {
        (self.flow, self.body)
    }
}

impl From<()> for Outcome {
    fn from(_: ()) -> Self {
        Outcome::halt()
    }
}

impl From<Payload> for Outcome {
    fn from(body: Payload) -> Self {
        Outcome::respond(body)
    }
}

impl From<&str> for Outcome {
    fn from(body: &str) -> Self {
        Outcome::respond(body)
    }
}

impl From<String> for Outcome {
    fn from(body: String) -> Self {
        Outcome::respond(body)
    }
}

impl From<Value> for Outcome {
    fn from(body: Value) -> Self {
        Outcome::respond(body)
    }
}

impl From<Bytes> for Outcome {
    fn from(body: Bytes) -> Self {
        Outcome::respond(body)
    }
}

impl From<Vec<u8>> for Outcome {
    fn from(body: Vec<u8>) -> Self {
        Outcome::respond(body)
    }
}

impl From<Blob> for Outcome {
    fn from(body: Blob) -> Self {
        Outcome::respond(body)
    }
}

impl From<FormData> for Outcome {
    fn from(body: FormData) -> Self {
        Outcome::respond(body)
    }
}

impl<T: Into<Outcome>> From<Option<T>> for Outcome {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// A route handler.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, ctx: Context) -> Result<Outcome, Error>;
}

#[async_trait]
impl<F, Fut, R> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: Into<Outcome> + Send + 'static,
{
    async fn call(&self, ctx: Context) -> Result<Outcome, Error> {
        (self)(ctx).await.map(Into::into)
    }
}

/// Route-level cache override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOption {
    /// Never cache.
    Disabled,
    /// Cache for the given number of seconds.
    MaxAge(u64),
}

/// Method-level configuration attached to a chain.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    pub body: Option<Arc<dyn Schema>>,
    pub cookies: Option<Arc<dyn Schema>>,
    pub headers: Option<Arc<dyn Schema>>,
    pub query: Option<Arc<dyn Schema>>,
    pub params: HashMap<String, Arc<dyn Schema>>,
    /// Flatten multipart bodies into a plain object before validation.
    pub transform: bool,
    /// Allowed origin, overriding the app-level setting.
    pub cors: Option<String>,
    pub cache: Option<CacheOption>,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, schema: impl Schema + 'static) -> Self {
        self.body = Some(Arc::new(schema));
        self
    }

    pub fn cookies(mut self, schema: impl Schema + 'static) -> Self {
        self.cookies = Some(Arc::new(schema));
        self
    }

    pub fn headers(mut self, schema: impl Schema + 'static) -> Self {
        self.headers = Some(Arc::new(schema));
        self
    }

    pub fn query(mut self, schema: impl Schema + 'static) -> Self {
        self.query = Some(Arc::new(schema));
        self
    }

    pub fn param(mut self, name: impl Into<String>, schema: impl Schema + 'static) -> Self {
        self.params.insert(name.into(), Arc::new(schema));
        self
    }

    pub fn transform(mut self, transform: bool) -> Self {
        self.transform = transform;
        self
    }

    pub fn cors(mut self, origin: impl Into<String>) -> Self {
        self.cors = Some(origin.into());
        self
    }

    pub fn cache(mut self, cache: CacheOption) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// Ordered handlers for one route, with optional leading options.
#[derive(Clone)]
pub struct Chain {
    options: Option<Arc<RouteOptions>>,
    handlers: Vec<Arc<dyn Handler>>,
}

impl Chain {
    pub fn new(handler: impl Handler) -> Self {
        Self {
            options: None,
            handlers: vec![Arc::new(handler)],
        }
    }

    /// Append a handler.
    pub fn then(mut self, handler: impl Handler) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Attach route options. At most one set; a second call replaces the first.
    pub fn options(mut self, options: RouteOptions) -> Self {
        self.options = Some(Arc::new(options));
        self
    }

    pub fn route_options(&self) -> Option<&Arc<RouteOptions>> {
        self.options.as_ref()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handlers in order against `ctx`.
    ///
    /// Stops before the next handler once the response holds a body and the
    /// previous handler did not ask to continue.
    pub async fn run(&self, ctx: &Context) -> Result<(), Error> {
        let mut proceed = false;

        for (index, handler) in self.handlers.iter().enumerate() {
            if ctx.res().has_body() && !proceed {
                tracing::debug!(handler = index, "Chain halted");
                break;
            }

            let (flow, body) = handler.call(ctx.clone()).await?.into_parts();
            if let Some(body) = body.filter(Payload::is_present) {
                ctx.res().set_body(body);
            }
            proceed = flow == Flow::Continue;
        }

        Ok(())
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("options", &self.options)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
