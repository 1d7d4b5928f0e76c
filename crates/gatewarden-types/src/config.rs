//! configuration types for gatewarden.

use serde::{Deserialize, Serialize};

/// main configuration for the gatewarden server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// address to bind the http server to.
    pub listen_addr: String,

    /// log filter (tracing env-filter syntax), overridable via env.
    pub log_level: String,

    /// cache rebuild tuning.
    pub rebuild: RebuildConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            rebuild: RebuildConfig::default(),
        }
    }
}

/// tuning for the background rebuild pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildConfig {
    /// coalescing window before a rebuild fires, in milliseconds.
    /// bursts of invalidations for the same user within this window
    /// trigger a single rebuild.
    pub debounce_ms: u64,

    /// how long a cold-cache read waits for an in-flight rebuild
    /// before computing synchronously, in milliseconds.
    pub cold_wait_ms: u64,

    /// base delay between rebuild retries after a failure, in
    /// milliseconds. doubles per consecutive failure.
    pub retry_backoff_ms: u64,

    /// consecutive failures before escalating to an operator-visible
    /// alert (error-level log).
    pub failure_alert_threshold: u32,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            cold_wait_ms: 5_000,
            retry_backoff_ms: 500,
            failure_alert_threshold: 3,
        }
    }
}
