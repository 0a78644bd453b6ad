//! Virtual-time environment.

use chatsync_core::Environment;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tokio::time::Instant;

/// Environment on tokio's clock.
///
/// Under a paused runtime (`start_paused = true`) time only moves when every
/// task is idle, so runs are reproducible. The wall clock is derived from the
/// same instant, starting at a fixed origin, so server and client timestamps
/// agree.
#[derive(Debug, Clone, Copy)]
pub struct SimEnv {
    origin: Instant,
    epoch: DateTime<Utc>,
}

impl SimEnv {
    /// Wall-clock origin of every simulation: 2024-01-01T00:00:00Z.
    pub fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Environment whose wall clock reads [`SimEnv::epoch`] now.
    pub fn new() -> Self {
        Self { origin: Instant::now(), epoch: Self::epoch() }
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let elapsed = Instant::now() - self.origin;
        self.epoch + TimeDelta::from_std(elapsed).unwrap_or(TimeDelta::zero())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn wall_clock_follows_virtual_time() {
        let env = SimEnv::new();
        assert_eq!(env.wall_clock(), SimEnv::epoch());

        tokio::time::sleep(Duration::from_secs(90)).await;

        assert_eq!(env.wall_clock(), SimEnv::epoch() + TimeDelta::seconds(90));
    }
}
