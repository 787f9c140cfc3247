//! HTTP abstractions shared by the dispatch core and the server host.
//!
//! # Data Flow
//! ```text
//! axum request
//!     → server.rs (connect info, tracing/timeout layers)
//!     → request.rs (read-once request abstraction)
//!     → [App::fetch: request-id span, extensions, routing, handler chain]
//!     → response.rs (normalize payload, finalize, HEAD strip)
//!     → Send to client
//! ```

pub mod payload;
pub mod request;
pub mod response;
pub mod server;

/// Outbound response abstraction.
pub type Response = axum::http::Response<axum::body::Body>;

pub use payload::{Blob, BodyStream, FormData, FormValue, Payload};
pub use request::{Request, X_REQUEST_ID};
pub use server::HttpServer;
