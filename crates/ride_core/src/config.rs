//! Engine tuning knobs.

use std::time::Duration;

/// Configuration for the matching engine.
///
/// Defaults are sized for a city deployment; tests shrink the durations to
/// keep the retry sweep and staleness checks fast.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// A driver whose last location ping is older than this is excluded from
    /// matching even while marked Online.
    pub stale_location_after: Duration,
    /// Interval between retry-sweep passes over Requested trips.
    pub sweep_interval: Duration,
    /// A trip Requested longer than this is auto-cancelled with reason
    /// Timeout.
    pub max_wait: Duration,
    /// How many nearest candidates one matching pass will attempt before
    /// giving up (each may be lost to a concurrent seat reservation).
    pub candidate_limit: usize,
    /// Max H3 grid-disk radius (cells) for the ring search around the pickup
    /// station before falling back to a full registry scan.
    pub search_ring_limit: u32,
    /// Per-user notification buffer; lagging subscribers lose oldest events.
    pub hub_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_location_after: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(120),
            candidate_limit: 5,
            search_ring_limit: 16,
            hub_buffer: 32,
        }
    }
}

impl EngineConfig {
    pub fn with_stale_location_after(mut self, after: Duration) -> Self {
        self.stale_location_after = after;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }

    pub fn with_hub_buffer(mut self, buffer: usize) -> Self {
        self.hub_buffer = buffer;
        self
    }
}
