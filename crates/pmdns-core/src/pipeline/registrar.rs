//! Registrar
//!
//! Applies accepted IPs to the name registry. A repeat of the cached value
//! is skipped while the cache entry is younger than the TTL. A different
//! value, or an expired entry, starts an update; at most one update is in
//! flight, and a newer IP cancels the older update before starting its own.
//!
//! The cache records what was *attempted*, not what succeeded. A failed
//! update is not retried for the same IP until the TTL runs out.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{EventSink, PipelineEvent};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::scope;
use crate::traits::NameRegistry;

/// Last value the registrar attempted to register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: IpAddr,
    pub applied_at: Instant,
}

struct InFlight {
    ip: IpAddr,
    scope: CancellationToken,
    handle: JoinHandle<Result<()>>,
}

type Joined = std::result::Result<Result<()>, JoinError>;

enum Step {
    Stop(&'static str),
    Finished(IpAddr, Joined),
    Received(IpAddr),
}

/// Debouncing, superseding registry updater
pub struct Registrar {
    registry: Arc<dyn NameRegistry>,
    scope: CancellationToken,
    cache_ttl: Duration,
    update_timeout: Duration,
    events: EventSink,
    cache: Option<CacheEntry>,
    in_flight: Option<InFlight>,
}

impl Registrar {
    pub fn new(
        registry: Arc<dyn NameRegistry>,
        scope: CancellationToken,
        config: &PipelineConfig,
        events: EventSink,
    ) -> Self {
        Self {
            registry,
            scope,
            cache_ttl: config.name_cache_ttl(),
            update_timeout: config.update_timeout(),
            events,
            cache: None,
            in_flight: None,
        }
    }

    pub fn cache(&self) -> Option<CacheEntry> {
        self.cache
    }

    /// Consume IPs until the scope is cancelled or the channel closes
    ///
    /// The returned handle completes after any in-flight update has been
    /// told to stop.
    pub fn spawn(self, ips: mpsc::Receiver<IpAddr>) -> JoinHandle<()> {
        tokio::spawn(self.run(ips))
    }

    async fn run(mut self, mut ips: mpsc::Receiver<IpAddr>) {
        let reason = loop {
            let step = tokio::select! {
                biased;

                _ = self.scope.cancelled() => Step::Stop("scope cancelled"),

                (ip, joined) = wait_in_flight(&mut self.in_flight) => Step::Finished(ip, joined),

                ip = ips.recv() => match ip {
                    Some(ip) => Step::Received(ip),
                    None => Step::Stop("input closed"),
                }
            };

            match step {
                Step::Stop(reason) => break reason,
                Step::Finished(ip, joined) => {
                    self.in_flight = None;
                    self.finish_update(ip, joined);
                }
                Step::Received(ip) => self.handle_ip(ip),
            }
        };

        if let Some(in_flight) = self.in_flight.take() {
            info!(ip = %in_flight.ip, "registration: cancelling in-flight update");
            in_flight.scope.cancel();
        }

        info!(reason, "registration: stopped");
        self.events.emit(PipelineEvent::Stopped {
            reason: reason.to_string(),
        });
    }

    fn handle_ip(&mut self, ip: IpAddr) {
        let now = Instant::now();

        match self.cache {
            Some(entry) if entry.value == ip => {
                let age = now.saturating_duration_since(entry.applied_at);
                let cache_ok = age < self.cache_ttl;
                info!(%ip, cache_ok, ?age, "registration: no change");
                if cache_ok {
                    self.events.emit(PipelineEvent::UpdateSkipped { ip });
                    return;
                }
            }
            Some(entry) => {
                let since_last_update = now.saturating_duration_since(entry.applied_at);
                info!(new = %ip, old = %entry.value, ?since_last_update, "registration: new ip");
            }
            None => info!(new = %ip, "registration: new ip, nothing registered yet"),
        }

        self.start_update(ip, now);
    }

    fn start_update(&mut self, ip: IpAddr, now: Instant) {
        if let Some(previous) = self.in_flight.take() {
            warn!(superseded = %previous.ip, by = %ip, "registration: superseding in-flight update");
            previous.scope.cancel();
            self.events.emit(PipelineEvent::UpdateSuperseded {
                ip: previous.ip,
                by: ip,
            });
        }

        let previous = self.cache.map(|entry| entry.value);
        self.cache = Some(CacheEntry {
            value: ip,
            applied_at: now,
        });

        let update_scope = scope::with_timeout(&self.scope, self.update_timeout);
        let registry = Arc::clone(&self.registry);
        let task_scope = update_scope.clone();
        let handle = tokio::spawn(async move {
            let _done = task_scope.clone().drop_guard();
            registry.set_name(&task_scope, ip).await
        });

        debug!(%ip, registry = self.registry.registry_name(), "registration: update started");
        self.in_flight = Some(InFlight {
            ip,
            scope: update_scope,
            handle,
        });
        self.events.emit(PipelineEvent::UpdateStarted { ip, previous });
    }

    fn finish_update(&mut self, ip: IpAddr, joined: Joined) {
        let error = match joined {
            Ok(Ok(())) => {
                info!(%ip, "registration: update applied");
                self.events.emit(PipelineEvent::UpdateSucceeded { ip });
                return;
            }
            Ok(Err(e)) if e.is_scope_terminated() => {
                warn!(%ip, "registration: update abandoned, deadline reached");
                e.to_string()
            }
            Ok(Err(e)) => {
                warn!(%ip, error = %e, "registration: update failed");
                e.to_string()
            }
            Err(e) => {
                error!(%ip, error = %e, "registration: update task failed");
                e.to_string()
            }
        };
        self.events.emit(PipelineEvent::UpdateFailed { ip, error });
    }
}

async fn wait_in_flight(slot: &mut Option<InFlight>) -> (IpAddr, Joined) {
    match slot {
        Some(in_flight) => {
            let joined = (&mut in_flight.handle).await;
            (in_flight.ip, joined)
        }
        None => std::future::pending().await,
    }
}
