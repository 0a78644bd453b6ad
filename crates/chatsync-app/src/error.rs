//! Runtime errors.

use thiserror::Error;

/// Errors surfaced by [`ChatHandle`](crate::ChatHandle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The runtime task has stopped.
    #[error("runtime stopped")]
    Closed,
}
