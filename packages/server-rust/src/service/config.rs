use std::time::Duration;

/// Gateway-level configuration for the dispatch pipeline.
///
/// Controls handler timeouts, concurrency limits, and background reload
/// intervals.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Identifier for this gateway node, attached to logs.
    pub node_id: String,
    /// Handler timeout for operations without their own override, in
    /// milliseconds.
    pub handler_timeout_ms: u64,
    /// Maximum number of concurrent invocations before load shedding.
    pub max_concurrent_invocations: u32,
    /// Interval between key-value snapshot reloads in milliseconds.
    pub metadata_reload_interval_ms: u64,
}

impl GatewayConfig {
    #[must_use]
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            handler_timeout_ms: 10_000,
            max_concurrent_invocations: 1000,
            metadata_reload_interval_ms: 30_000,
        }
    }
}
