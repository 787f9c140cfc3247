//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch produces:
//!     → logging.rs (structured log events, request-id spans)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, plain or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID carried on the per-request span
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
