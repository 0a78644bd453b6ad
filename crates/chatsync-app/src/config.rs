//! Runtime configuration.

use std::time::Duration;

/// Runtime tuning.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How often the engine is ticked. Bounds timeout and reconcile latency.
    pub tick_interval: Duration,
    /// How often the snapshot is republished so the derived roster
    /// `active` flags follow the clock.
    pub activity_refresh: Duration,
    /// Capacity of the intent channel.
    pub command_buffer: usize,
    /// Capacity of the notice broadcast. Slow subscribers lose the oldest.
    pub notice_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            activity_refresh: Duration::from_secs(30),
            command_buffer: 64,
            notice_buffer: 64,
        }
    }
}
