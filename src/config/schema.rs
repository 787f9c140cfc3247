//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::runtime::Runtime;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Dispatch settings of the app.
    pub app: AppSettings,

    /// Shared response cache. Absent means no caching.
    pub cache: Option<CacheSettings>,

    /// Hosting runtime.
    pub runtime: RuntimeSettings,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// App-level dispatch settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppSettings {
    /// Path prefix prepended to every route ("/" for none).
    pub base: String,

    /// Allowed CORS origin.
    pub cors: Option<String>,

    /// Match `OPTIONS` preflights against routes of any method.
    pub preflight: bool,

    /// Log one line per request.
    pub debug: bool,

    /// Deadline for validated body reads, in milliseconds.
    pub body_deadline_ms: u64,

    /// Largest body read into memory.
    pub max_body_bytes: usize,

    /// Most header entries copied into the header view.
    pub max_headers: usize,

    /// Longest accepted cookie header.
    pub max_cookie_header: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            base: "/".to_string(),
            cors: None,
            preflight: false,
            debug: false,
            body_deadline_ms: 2500,
            max_body_bytes: 2 * 1024 * 1024,
            max_headers: 50,
            max_cookie_header: 1000,
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Cache name.
    pub name: String,

    /// Freshness lifetime advertised on GET responses, in seconds.
    pub max_age: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            name: "velox".to_string(),
            max_age: 0,
        }
    }
}

/// Hosting runtime settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// `server` or `edge`.
    pub kind: Runtime,

    /// Header carrying the client IP on the edge runtime.
    pub ip_header: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            kind: Runtime::Server,
            ip_header: "cf-connecting-ip".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
