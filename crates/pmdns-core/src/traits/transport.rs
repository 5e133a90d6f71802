// # Transport Trait
//
// A single request/response exchange, executed (and repeated) by the
// resilient caller.

use async_trait::async_trait;

/// One-shot request executor used by [`ResilientCaller`](crate::caller::ResilientCaller)
///
/// `execute` performs exactly one attempt. Retrying, backoff and
/// cancellation are the caller's job.
///
/// # Aborting In-Flight Requests
///
/// When the caller's scope is cancelled mid-request the caller drops the
/// attempt if [`Transport::supports_abort`] is true, which for async clients
/// such as reqwest closes the connection. A transport that cannot be
/// interrupted (for example one that runs a blocking client on a worker
/// thread) returns false: the caller then stops waiting, logs the degraded
/// cancellation, and lets the request finish in the background with its
/// result discarded.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Request description, reusable across attempts
    type Request: Send + Sync + 'static;

    /// Successful response payload
    type Response: Send + 'static;

    /// Perform a single attempt
    ///
    /// Errors returned here are treated as transient and retried.
    async fn execute(&self, request: &Self::Request) -> Result<Self::Response, crate::Error>;

    /// Whether dropping an in-flight `execute` future aborts the request
    fn supports_abort(&self) -> bool {
        true
    }
}
