//! Velox: HTTP request dispatch.
//!
//! Routes requests through a segment trie to chains of async handlers,
//! wraps each request in a validated context, runs prefix-scoped
//! extensions around dispatch, and normalizes whatever the handlers
//! produced into a response.

pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod extension;
pub mod handler;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod runtime;
pub mod schema;

pub use app::{App, Attachment};
pub use config::Config;
pub use context::{Context, CookieOptions, SameSite};
pub use error::Error;
pub use extension::Extension;
pub use handler::{CacheOption, Chain, Flow, Handler, Outcome, RouteOptions};
pub use http::{HttpServer, Payload, Request, Response};
pub use lifecycle::Shutdown;
pub use routing::Collection;
pub use runtime::{Env, Runtime, RuntimeConfig};
pub use schema::{JsonSchema, Schema};
