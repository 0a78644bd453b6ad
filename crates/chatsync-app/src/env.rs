//! Production environment.

use std::time::Instant;

use chatsync_core::Environment;
use chrono::{DateTime, Utc};

/// System clocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
