//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (at startup):
//!     (method, pattern, chain)
//!     → pattern.rs (parse literal / :param / * segments)
//!     → router.rs (insert into the method's segment tree)
//!
//! Incoming Request (method, path)
//!     → router.rs (walk segments: literal, then param, then wildcard)
//!     → Return: Matched { params, chain } or None
//! ```
//!
//! # Design Decisions
//! - Routes registered at startup, immutable while serving
//! - No regex in the hot path
//! - Deterministic: same input always matches same route
//! - Literal segments beat parameters at the same depth

pub mod collection;
pub mod pattern;
pub mod router;

pub use collection::Collection;
pub use pattern::{Pattern, RouteError, Segment, WILDCARD};
pub use router::{Matched, Router};
