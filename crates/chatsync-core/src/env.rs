//! Environment abstraction for deterministic testing.
//!
//! Decouples engine logic from system clocks. Enables deterministic
//! simulation (paused tokio clock, fixed wall-clock origin) and production use
//! with real system time.

use std::{fmt::Debug, ops::Sub, time::Duration};

use chrono::{DateTime, Utc};

/// Abstract environment providing monotonic and wall-clock time.
///
/// # Invariants
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `wall_clock()` advances together with `now()` within one execution
///   context, so locally generated timestamps are non-decreasing
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, while simulation
    /// environments use virtual time (e.g., `tokio::time::Instant` with a
    /// paused clock).
    type Instant: Copy + Ord + Debug + Send + Sync + Sub<Output = Duration>;

    /// Current time (monotonic).
    ///
    /// Used for request timeouts and scheduled reconciliation. Subsequent
    /// calls must return times >= previous calls.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time.
    ///
    /// Used for timestamps that leave the engine or are compared with server
    /// timestamps: provisional `created_at`, presence announcements and the
    /// roster activity heuristic.
    fn wall_clock(&self) -> DateTime<Utc>;
}
