//! Extension (middleware) hooks.
//!
//! # Responsibilities
//! - Define the pre-dispatch and post-dispatch hook contract
//! - Adapt plain closures plus a configuration value into an extension
//!
//! # Design Decisions
//! - An extension owns its configuration; hooks read it through `self`
//! - A pre-dispatch response replaces routing entirely
//! - Post-dispatch hooks observe and mutate the context, never replace it

pub mod registry;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Error;
use crate::http::{Request, Response};

pub use registry::{Registry, GLOBAL_PREFIX};

/// A prefix-scoped request hook.
#[async_trait]
pub trait Extension: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str {
        "extension"
    }

    /// Runs before routing. Returning a response ends the request.
    async fn on_request(&self, _request: &Request) -> Result<Option<Response>, Error> {
        Ok(None)
    }

    /// Runs after the response has been normalized.
    async fn on_response(&self, _ctx: &Context) {}
}

type OnRequestFn<C> = Box<dyn Fn(&Request, &C) -> Option<Response> + Send + Sync>;
type OnResponseFn<C> = Box<dyn Fn(&Context, &C) + Send + Sync>;

/// Extension built from closures and a configuration value.
pub struct FnExtension<C> {
    name: String,
    config: C,
    on_request: Option<OnRequestFn<C>>,
    on_response: Option<OnResponseFn<C>>,
}

/// Start building an extension around `config`.
pub fn from_fn<C>(name: impl Into<String>, config: C) -> FnExtension<C>
where
    C: Send + Sync + 'static,
{
    FnExtension {
        name: name.into(),
        config,
        on_request: None,
        on_response: None,
    }
}

impl<C> FnExtension<C>
where
    C: Send + Sync + 'static,
{
    pub fn on_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Request, &C) -> Option<Response> + Send + Sync + 'static,
    {
        self.on_request = Some(Box::new(hook));
        self
    }

    pub fn on_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Context, &C) + Send + Sync + 'static,
    {
        self.on_response = Some(Box::new(hook));
        self
    }
}

#[async_trait]
impl<C> Extension for FnExtension<C>
where
    C: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_request(&self, request: &Request) -> Result<Option<Response>, Error> {
        Ok(self
            .on_request
            .as_ref()
            .and_then(|hook| hook(request, &self.config)))
    }

    async fn on_response(&self, ctx: &Context) {
        if let Some(hook) = &self.on_response {
            hook(ctx, &self.config);
        }
    }
}
