//! Discovery poller
//!
//! Turns ticks into [`Observation`]s. Each tick starts a fresh discovery
//! attempt on its own task and cancels the previous one: a poll that is
//! still running when the next tick arrives is stale and not worth waiting
//! for.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::scope;
use crate::tick::TickReceiver;
use crate::traits::IpDiscovery;

/// Outcome of one discovery attempt
///
/// `observed_at` is when the attempt *started*, so ordering reflects when
/// the question was asked rather than which answer happened to arrive first.
#[derive(Debug)]
pub struct Observation {
    pub observed_at: DateTime<Utc>,
    pub result: Result<IpAddr>,
}

impl Observation {
    pub fn success(observed_at: DateTime<Utc>, ip: IpAddr) -> Self {
        Self {
            observed_at,
            result: Ok(ip),
        }
    }

    pub fn failure(observed_at: DateTime<Utc>, error: Error) -> Self {
        Self {
            observed_at,
            result: Err(error),
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.result.as_ref().ok().copied()
    }
}

/// Tick-driven discovery loop
pub struct Poller {
    discovery: Arc<dyn IpDiscovery>,
    scope: CancellationToken,
    attempt_timeout: Duration,
}

impl Poller {
    /// # Parameters
    ///
    /// - `discovery`: Service queried on every tick
    /// - `scope`: Pipeline scope; every attempt runs in a child of it
    /// - `attempt_timeout`: Upper bound for a single attempt
    pub fn new(
        discovery: Arc<dyn IpDiscovery>,
        scope: CancellationToken,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            discovery,
            scope,
            attempt_timeout,
        }
    }

    /// Start polling on every tick from `ticks`
    ///
    /// The returned channel holds at most one undelivered observation. It
    /// closes once the loop has stopped and every attempt has finished.
    pub fn spawn(self, ticks: TickReceiver) -> (mpsc::Receiver<Observation>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(self.run(ticks, tx));
        (rx, handle)
    }

    async fn run(self, mut ticks: TickReceiver, results: mpsc::Sender<Observation>) {
        let mut last_attempt: Option<CancellationToken> = None;

        loop {
            tokio::select! {
                biased;

                _ = self.scope.cancelled() => {
                    debug!("discovery: scope cancelled, stopping poller");
                    break;
                }

                tick = ticks.recv() => {
                    if let Some(previous) = last_attempt.take() {
                        if !previous.is_cancelled() {
                            debug!("discovery: cancelling outstanding attempt");
                        }
                        previous.cancel();
                    }
                    if tick.is_none() {
                        debug!("discovery: tick source closed, stopping poller");
                        break;
                    }

                    let attempt = scope::with_timeout(&self.scope, self.attempt_timeout);
                    last_attempt = Some(attempt.clone());
                    tokio::spawn(poll_once(
                        Arc::clone(&self.discovery),
                        attempt,
                        results.clone(),
                    ));
                }
            }
        }

        if let Some(previous) = last_attempt.take() {
            previous.cancel();
        }
    }
}

async fn poll_once(
    discovery: Arc<dyn IpDiscovery>,
    scope: CancellationToken,
    results: mpsc::Sender<Observation>,
) {
    let _done = scope.clone().drop_guard();

    let observed_at = Utc::now();
    trace!(service = discovery.service_name(), %observed_at, "discovery: attempt started");
    let result = discovery.get_ip(&scope).await;

    if let Err(e) = &result
        && scope.is_cancelled()
    {
        debug!(error = %e, "discovery: attempt ended with its scope");
    }

    let observation = Observation { observed_at, result };
    tokio::select! {
        biased;
        _ = scope.cancelled() => trace!("discovery: result abandoned"),
        sent = results.send(observation) => {
            if sent.is_err() {
                trace!("discovery: result receiver gone");
            }
        }
    }
}
