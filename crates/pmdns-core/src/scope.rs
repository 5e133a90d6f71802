//! Cancellation scope helpers
//!
//! Every unit of work in the pipeline runs under a
//! [`CancellationToken`]. Scopes form a tree: the supervisor's root scope is
//! the parent of each poll attempt and each registry update, so cancelling
//! the root reaches everything below it.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Create a child of `parent` that is also cancelled after `timeout`
///
/// The timer task ends as soon as the returned scope is cancelled by any
/// means, so callers should cancel the scope when their work is done, for
/// example by holding `scope.clone().drop_guard()` for the duration of the
/// work.
pub fn with_timeout(parent: &CancellationToken, timeout: Duration) -> CancellationToken {
    let scope = parent.child_token();
    let timer = scope.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                debug!(?timeout, "scope deadline reached");
                timer.cancel();
            }
        }
    });

    scope
}
