//! Monitoring events emitted by the pipeline stages

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Events emitted by the coordinator and registrar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A fresh observation was accepted and queued for the registrar
    IpAccepted {
        ip: IpAddr,
        observed_at: DateTime<Utc>,
    },

    /// An observation was dropped by the coordinator
    ObservationDiscarded {
        observed_at: DateTime<Utc>,
        reason: DiscardReason,
    },

    /// The registrar skipped an update because its cache is still warm
    UpdateSkipped { ip: IpAddr },

    /// A registry update was started
    UpdateStarted {
        ip: IpAddr,
        previous: Option<IpAddr>,
    },

    /// A registry update completed successfully
    UpdateSucceeded { ip: IpAddr },

    /// A registry update failed or was abandoned
    UpdateFailed { ip: IpAddr, error: String },

    /// An in-flight update was cancelled in favour of a newer IP
    UpdateSuperseded { ip: IpAddr, by: IpAddr },

    /// The registrar stopped
    Stopped { reason: String },
}

/// Why the coordinator dropped an observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// The discovery attempt failed
    Failed(String),
    /// Not newer than the last accepted observation
    Stale { last_accepted: DateTime<Utc> },
}

/// Non-blocking event emitter shared by the stages
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event without waiting
    ///
    /// A full channel means nobody is keeping up with the events; the event
    /// is dropped rather than stalling the pipeline.
    pub fn emit(&self, event: PipelineEvent) {
        let Some(tx) = &self.tx else { return };
        match tx.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => {
                warn!(?event, "event channel full, dropping event");
            }
        }
    }
}
