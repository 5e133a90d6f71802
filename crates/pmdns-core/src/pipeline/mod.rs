// # Pipeline
//
// Wires the stages together:
//
//   ticks -> Poller -> Observation -> Coordinator -> IpAddr -> Registrar
//
// Every stage runs on its own task under one root scope. Cancelling the root
// scope, or closing the tick source, winds the chain down from whichever end
// was hit first; the pipeline is done once the registrar has stopped.

pub mod coordinator;
pub mod events;
pub mod poller;
pub mod registrar;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::stats::{PipelineStats, StatsHandle};
use crate::tick::{self, TickReceiver};
use crate::traits::{IpDiscovery, NameRegistry};

pub use coordinator::{Coordinator, Verdict};
pub use events::{DiscardReason, EventSink, PipelineEvent};
pub use poller::{Observation, Poller};
pub use registrar::{CacheEntry, Registrar};

/// A running discovery → registration pipeline
///
/// Dropping the handle cancels the pipeline scope.
#[derive(Debug)]
pub struct Pipeline {
    scope: CancellationToken,
    done: CancellationToken,
    stats: StatsHandle,
}

impl Pipeline {
    /// Start a pipeline that polls immediately and then every
    /// `config.poll_interval()`
    ///
    /// The pipeline runs under a child of `parent`; cancelling `parent`
    /// shuts it down.
    ///
    /// # Returns
    ///
    /// The pipeline handle and the receiving end of the monitoring event
    /// channel. The receiver can be dropped if events are not wanted.
    pub fn start(
        discovery: Arc<dyn IpDiscovery>,
        registry: Arc<dyn NameRegistry>,
        config: PipelineConfig,
        parent: &CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<PipelineEvent>)> {
        config.validate()?;

        let scope = parent.child_token();
        let (ticks, tick_rx) = tick::channel();
        ticks.fire();
        tick::spawn_interval(ticks, config.poll_interval(), scope.clone());

        Ok(Self::launch(discovery, registry, config, scope, tick_rx))
    }

    /// Start a pipeline driven by an external tick source
    ///
    /// No immediate poll is made; the pipeline polls exactly when the
    /// source fires. Dropping every sender of the source drains and stops
    /// the pipeline.
    pub fn start_with_ticks(
        discovery: Arc<dyn IpDiscovery>,
        registry: Arc<dyn NameRegistry>,
        config: PipelineConfig,
        parent: &CancellationToken,
        ticks: TickReceiver,
    ) -> Result<(Self, mpsc::Receiver<PipelineEvent>)> {
        config.validate()?;
        let scope = parent.child_token();
        Ok(Self::launch(discovery, registry, config, scope, ticks))
    }

    fn launch(
        discovery: Arc<dyn IpDiscovery>,
        registry: Arc<dyn NameRegistry>,
        config: PipelineConfig,
        scope: CancellationToken,
        ticks: TickReceiver,
    ) -> (Self, mpsc::Receiver<PipelineEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let events = EventSink::new(event_tx);
        let stats = StatsHandle::new();

        info!(
            discovery = discovery.service_name(),
            registry = registry.registry_name(),
            poll_interval = ?config.poll_interval(),
            name_cache_ttl = ?config.name_cache_ttl(),
            "starting pipeline"
        );

        let (observations, _poller) =
            Poller::new(discovery, scope.clone(), config.poll_timeout()).spawn(ticks);
        let (ips, _coordinator) =
            Coordinator::new(events.clone()).spawn(observations, scope.clone(), stats.clone());
        let registrar = Registrar::new(registry, scope.clone(), &config, events).spawn(ips);

        let done = CancellationToken::new();
        let finished = done.clone();
        tokio::spawn(async move {
            if let Err(e) = registrar.await {
                error!(error = %e, "registrar task failed");
            }
            info!("pipeline done");
            finished.cancel();
        });

        (Self { scope, done, stats }, event_rx)
    }

    /// Latest stats snapshot
    pub fn stats(&self) -> PipelineStats {
        self.stats.snapshot()
    }

    /// Shared handle for readers that outlive a borrow of the pipeline
    pub fn stats_handle(&self) -> StatsHandle {
        self.stats.clone()
    }

    /// Cancel the pipeline scope
    ///
    /// Returns immediately; use [`Pipeline::wait`] to wait for the stages
    /// to stop.
    pub fn shutdown(&self) {
        self.scope.cancel();
    }

    /// Wait until the registrar has stopped
    pub async fn wait(&self) {
        self.done.cancelled().await;
    }

    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }

    /// The pipeline's root scope
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}
