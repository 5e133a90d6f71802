//! Pipeline statistics shared with external readers
//!
//! The only state that crosses the pipeline boundary. Writers build a whole
//! new [`PipelineStats`] and swap it in under the write lock; readers clone
//! the current value under the read lock, so a reader always sees a complete
//! snapshot.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of pipeline liveness
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Last time an IP was handed to the registrar (RFC 3339, UTC)
    #[serde(rename = "LastPoll")]
    pub last_poll: String,

    /// Same instant as nanoseconds since the Unix epoch
    #[serde(rename = "LastPollNs")]
    pub last_poll_nanos: i64,
}

impl PipelineStats {
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            last_poll: time.to_rfc3339_opts(SecondsFormat::Nanos, true),
            last_poll_nanos: time.timestamp_nanos_opt().unwrap_or(i64::MAX),
        }
    }

    /// True until the first poll has been recorded
    pub fn is_empty(&self) -> bool {
        self.last_poll_nanos == 0
    }
}

/// Cloneable handle to the shared stats record
#[derive(Debug, Clone, Default)]
pub struct StatsHandle {
    inner: Arc<RwLock<PipelineStats>>,
}

impl StatsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current snapshot
    pub fn snapshot(&self) -> PipelineStats {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the whole snapshot
    pub fn replace(&self, stats: PipelineStats) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = stats;
    }

    /// Record a poll at the current time
    pub fn record_poll(&self) {
        self.replace(PipelineStats::at(Utc::now()));
    }
}
