//! Resilient caller
//!
//! Executes one logical request through a [`Transport`], retrying transport
//! failures with exponential backoff, and gives up the moment its scope is
//! cancelled.
//!
//! ## Attempt Lifecycle
//!
//! ```text
//!   call(scope, request)
//!        │
//!        ▼
//!   ┌─────────────┐  spawn   ┌───────────────────────────────────┐
//!   │ select on   │─────────▶│ attempt task                      │
//!   │ scope +     │          │  loop:                            │
//!   │ attempt     │◀─────────│   execute ── ok ──▶ return        │
//!   └─────────────┘  result  │      └─ err ─▶ sleep(backoff)     │
//!        │                   │              (races the scope)    │
//!        │ scope cancelled   └───────────────────────────────────┘
//!        ▼
//!   abort attempt (or abandon it if the transport cannot abort)
//!   return Error::ScopeTerminated
//! ```
//!
//! The attempt runs on its own task so that a transport which cannot be
//! interrupted never holds the caller hostage: the caller always returns as
//! soon as the scope ends.

mod backoff;
pub mod http;

pub use backoff::Backoff;
pub use http::{HttpRequest, HttpResponse, HttpTransport};

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::traits::Transport;

/// Retrying, cancellable request executor
///
/// Shared by the discovery service and the registry client; each wraps its
/// own transport and retry policy.
pub struct ResilientCaller<T: Transport> {
    transport: Arc<T>,
    retry: RetryConfig,
    name: &'static str,
}

impl<T: Transport> Clone for ResilientCaller<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            retry: self.retry.clone(),
            name: self.name,
        }
    }
}

impl<T: Transport> std::fmt::Debug for ResilientCaller<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientCaller")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ResilientCaller<T> {
    /// Create a caller around `transport`
    pub fn new(transport: T, retry: RetryConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            retry,
            name: "caller",
        }
    }

    /// Set the name used in log lines
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Execute `request`, retrying transport failures until it succeeds,
    /// the attempt budget runs out, or `scope` is cancelled
    ///
    /// # Returns
    ///
    /// - `Ok(response)`: An attempt succeeded
    /// - `Err(Error::ScopeTerminated)`: `scope` was cancelled first
    /// - `Err(Error::RetriesExhausted)`: Every allowed attempt failed
    pub async fn call(&self, scope: &CancellationToken, request: T::Request) -> Result<T::Response> {
        if scope.is_cancelled() {
            return Err(Error::ScopeTerminated);
        }

        let attempts_scope = scope.child_token();
        let mut task = AttemptTask {
            handle: tokio::spawn(retry_loop(
                Arc::clone(&self.transport),
                self.retry.clone(),
                attempts_scope.clone(),
                request,
                self.name,
            )),
            abortable: self.transport.supports_abort(),
            scope: attempts_scope,
        };
        let abortable = task.abortable;

        tokio::select! {
            biased;

            _ = scope.cancelled() => {
                if !abortable {
                    warn!(
                        caller = self.name,
                        "transport cannot abort in-flight requests; abandoning the attempt in the background"
                    );
                }
                Err(Error::ScopeTerminated)
            }

            joined = &mut task.handle => match joined {
                Ok(result) => result,
                Err(e) => Err(Error::Other(format!("{}: attempt task failed: {}", self.name, e))),
            },
        }
    }
}

/// Owns the spawned attempt loop; stops it when the call returns or is dropped
struct AttemptTask<R> {
    handle: JoinHandle<Result<R>>,
    abortable: bool,
    scope: CancellationToken,
}

impl<R> Drop for AttemptTask<R> {
    fn drop(&mut self) {
        // No new attempt may start once the caller has stopped listening.
        self.scope.cancel();
        if self.abortable {
            self.handle.abort();
        }
    }
}

async fn retry_loop<T: Transport>(
    transport: Arc<T>,
    retry: RetryConfig,
    scope: CancellationToken,
    request: T::Request,
    name: &'static str,
) -> Result<T::Response> {
    let mut backoff = Backoff::from_config(&retry);
    let mut attempt: u32 = 0;

    loop {
        if scope.is_cancelled() {
            return Err(Error::ScopeTerminated);
        }

        attempt += 1;
        debug!(caller = name, attempt, "executing request");

        let err = match transport.execute(&request).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };
        warn!(caller = name, attempt, error = %err, "attempt failed");

        if !retry.is_unlimited() && i64::from(attempt) >= i64::from(retry.max_attempts) {
            return Err(Error::RetriesExhausted {
                attempts: attempt,
                source: Box::new(err),
            });
        }

        let delay = backoff.next().unwrap_or_else(|| retry.max_delay());
        tokio::select! {
            biased;
            _ = scope.cancelled() => return Err(Error::ScopeTerminated),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
