//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Init logging/metrics → Build app → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C or trigger → Stop accepting → Drain in-flight requests → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then observability, then listener
//! - One broadcast signal shared by every long-running task

pub mod shutdown;

pub use shutdown::Shutdown;
