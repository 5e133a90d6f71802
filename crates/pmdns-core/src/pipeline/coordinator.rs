//! Observation coordinator
//!
//! Sits between the poller and the registrar. Only observations that are
//! strictly newer than the last accepted one get through, so an old poll
//! that finishes late can never overwrite a newer answer. Delivery to the
//! registrar goes through a single pending slot: a newer IP replaces an
//! undelivered older one instead of queueing behind it.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{DiscardReason, EventSink, PipelineEvent};
use super::poller::Observation;
use crate::stats::StatsHandle;

/// What the coordinator decided about one observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Newer than anything seen so far; hand it to the registrar
    Forward(IpAddr),
    /// The discovery attempt failed
    Failed,
    /// Not newer than the last accepted observation
    Stale { last_accepted: DateTime<Utc> },
}

/// Ordering state for observations
#[derive(Debug, Default)]
pub struct Coordinator {
    last_accepted: Option<(IpAddr, DateTime<Utc>)>,
    events: EventSink,
}

impl Coordinator {
    pub fn new(events: EventSink) -> Self {
        Self {
            last_accepted: None,
            events,
        }
    }

    /// Last accepted IP and when it was observed
    pub fn last_accepted(&self) -> Option<(IpAddr, DateTime<Utc>)> {
        self.last_accepted
    }

    /// Judge one observation and update the ordering state
    pub fn observe(&mut self, observation: Observation) -> Verdict {
        let observed_at = observation.observed_at;

        let ip = match observation.result {
            Ok(ip) => ip,
            Err(e) => {
                warn!(error = %e, %observed_at, "coordinator: discovery failed");
                self.events.emit(PipelineEvent::ObservationDiscarded {
                    observed_at,
                    reason: DiscardReason::Failed(e.to_string()),
                });
                return Verdict::Failed;
            }
        };

        if let Some((_, last_accepted)) = self.last_accepted
            && observed_at <= last_accepted
        {
            info!(%ip, %observed_at, %last_accepted, "coordinator: observation is in the past, discarding");
            self.events.emit(PipelineEvent::ObservationDiscarded {
                observed_at,
                reason: DiscardReason::Stale { last_accepted },
            });
            return Verdict::Stale { last_accepted };
        }

        debug!(%ip, %observed_at, "coordinator: accepted");
        self.last_accepted = Some((ip, observed_at));
        self.events
            .emit(PipelineEvent::IpAccepted { ip, observed_at });
        Verdict::Forward(ip)
    }

    /// Run the coordinator loop
    ///
    /// Returns the channel the registrar reads from. It closes when the
    /// scope is cancelled, or once the observation source has closed and
    /// the pending IP (if any) has been delivered.
    pub fn spawn(
        self,
        observations: mpsc::Receiver<Observation>,
        scope: CancellationToken,
        stats: StatsHandle,
    ) -> (mpsc::Receiver<IpAddr>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(self.run(observations, tx, scope, stats));
        (rx, handle)
    }

    async fn run(
        mut self,
        mut observations: mpsc::Receiver<Observation>,
        forward: mpsc::Sender<IpAddr>,
        scope: CancellationToken,
        stats: StatsHandle,
    ) {
        let mut pending: Option<IpAddr> = None;
        let mut upstream_open = true;

        while upstream_open || pending.is_some() {
            tokio::select! {
                biased;

                _ = scope.cancelled() => {
                    debug!("coordinator: scope cancelled");
                    break;
                }

                permit = forward.reserve(), if pending.is_some() => {
                    let Ok(permit) = permit else {
                        debug!("coordinator: registrar gone");
                        break;
                    };
                    if let Some(ip) = pending.take() {
                        permit.send(ip);
                        stats.record_poll();
                    }
                }

                observation = observations.recv(), if upstream_open => match observation {
                    Some(observation) => {
                        if let Verdict::Forward(ip) = self.observe(observation) {
                            if let Some(replaced) = pending.replace(ip) {
                                debug!(%replaced, %ip, "coordinator: newer ip replaces undelivered one");
                            }
                        }
                    }
                    None => upstream_open = false,
                }
            }
        }
    }
}
