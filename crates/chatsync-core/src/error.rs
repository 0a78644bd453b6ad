//! Error types shared by the engine and its collaborators.
//!
//! Every backend call reports failure as an [`ApiError`]. The engine never
//! propagates these to its caller; it classifies them (absence, transient,
//! fatal for the operation) and converts them into local state changes.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single backend request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The requested resource does not exist (HTTP 404).
    #[error("resource not found")]
    NotFound,

    /// The bearer token was missing, expired or rejected (HTTP 401/403).
    #[error("unauthorized")]
    Unauthorized,

    /// The server failed to process the request (HTTP 5xx).
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The server rejected the request (HTTP 4xx other than 401/403/404).
    #[error("request rejected with {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Network-level failure (DNS, connection reset, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// No response within the allotted time.
    #[error("request timed out after {elapsed:?}")]
    Timeout {
        /// How long we waited.
        elapsed: Duration,
    },

    /// The response could not be decoded into the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Returns true if this error means "the resource is not there".
    ///
    /// The conversation lookup endpoint answers a missing pair with either 404
    /// or a 5xx, so both count as absence and trigger the create fallback.
    pub fn is_absence(&self) -> bool {
        matches!(self, Self::NotFound | Self::Server { .. })
    }
}
