//! Ordered extension registrations.
//!
//! # Responsibilities
//! - Keep `(prefix, extension)` pairs in registration order
//! - Run pre-dispatch hooks until the first response
//! - Run every matching post-dispatch hook
//!
//! # Design Decisions
//! - Prefix matching is a plain `starts_with` on the URL path
//! - `*` applies to every request

use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::extension::Extension;
use crate::http::{Request, Response};

/// Prefix matching every path.
pub const GLOBAL_PREFIX: &str = "*";

/// Extensions in registration order.
#[derive(Default)]
pub struct Registry {
    entries: Vec<(String, Arc<dyn Extension>)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, prefix: impl Into<String>, extension: Arc<dyn Extension>) {
        let prefix = prefix.into();
        tracing::debug!(prefix = %prefix, extension = %extension.name(), "Extension registered");
        self.entries.push((prefix, extension));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn matching<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Arc<dyn Extension>> + 'a {
        self.entries
            .iter()
            .filter(move |(prefix, _)| applies(prefix, path))
            .map(|(_, extension)| extension)
    }

    /// Run pre-dispatch hooks. The first response short-circuits the rest.
    pub async fn run_pre_dispatch(&self, request: &Request, path: &str) -> Result<Option<Response>, Error> {
        for extension in self.matching(path) {
            if let Some(response) = extension.on_request(request).await? {
                tracing::debug!(extension = %extension.name(), path = %path, "Extension answered request");
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Run every matching post-dispatch hook in order.
    pub async fn run_post_dispatch(&self, ctx: &Context, path: &str) {
        for extension in self.matching(path) {
            extension.on_response(ctx).await;
        }
    }
}

fn applies(prefix: &str, path: &str) -> bool {
    prefix == GLOBAL_PREFIX || path.starts_with(prefix)
}
