//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → AppSettings handed to App, the rest to the server host
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AppSettings, CacheSettings, Config, ListenerConfig, ObservabilityConfig, RuntimeSettings,
    TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
