//! Request execution.
//!
//! The [`Backend`] trait decouples the runtime from how requests reach the
//! server. Production uses the REST transport; simulation answers from an
//! in-memory store.

use std::future::Future;

use chatsync_client::{ApiError, ApiRequest, ApiResponse};

/// Executes engine requests.
///
/// Each request runs on its own task, so implementations are cloned into the
/// task and must tolerate concurrent calls.
///
/// # Implementations
///
/// - **Production**: `HttpTransport` (feature `http`)
/// - **Simulation**: the harness's in-memory server
pub trait Backend: Clone + Send + Sync + 'static {
    /// Execute one request.
    fn execute(
        &self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, ApiError>> + Send;
}

#[cfg(feature = "http")]
impl Backend for chatsync_client::transport::HttpTransport {
    fn execute(
        &self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, ApiError>> + Send {
        chatsync_client::transport::HttpTransport::execute(self, request)
    }
}
