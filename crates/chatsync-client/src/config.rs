//! Engine configuration.

use std::time::Duration;

use chrono::TimeDelta;

/// Tunables for [`crate::Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Messages requested per history page.
    pub page_size: u32,

    /// Requests older than this are failed with [`chatsync_core::ApiError::Timeout`].
    pub request_timeout: Duration,

    /// Delay between a persist acknowledgement and the confirmatory refresh.
    /// Zero refreshes immediately.
    pub reconcile_delay: Duration,

    /// Accepted refreshes an acknowledged message may be missing from before
    /// the send is reported as failed.
    pub max_reconcile_misses: u32,

    /// Fetch a last-message preview for every contact after a roster load.
    pub load_previews: bool,

    /// A contact whose last message is younger than this counts as active.
    pub recent_message_window: TimeDelta,

    /// A contact seen more recently than this counts as active.
    pub recent_seen_window: TimeDelta,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            request_timeout: Duration::from_secs(10),
            reconcile_delay: Duration::from_secs(1),
            max_reconcile_misses: 3,
            load_previews: true,
            recent_message_window: TimeDelta::minutes(30),
            recent_seen_window: TimeDelta::minutes(5),
        }
    }
}
