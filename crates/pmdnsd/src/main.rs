// # pmdnsd - Dynamic DNS Daemon
//
// Keeps one DreamHost DNS record pointed at this host's public IP.
//
// The daemon is a thin integration layer: it reads the environment, builds
// the HTTP discovery service and the DreamHost registry, starts the
// pipeline from pmdns-core and supervises it. No discovery, retry or
// registration logic lives here.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Daemon
// - `PMDNS_CONFIG`: Path of a configuration file (logged only)
// - `PMDNS_DEBUG_HTTP_ADDR`: Debug endpoint address (default `0.0.0.0:9191`,
//   empty disables it)
// - `PMDNS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `PMDNS_SHUTDOWN_TIMEOUT_SECS`: Grace period after a signal (default 10)
//
// ### Pipeline
// - `PMDNS_POLL_INTERVAL_SECS`: Seconds between polls (default 30)
// - `PMDNS_NAME_CACHE_TTL_SECS`: Re-push window for an unchanged IP
//   (default 3600)
// - `PMDNS_DISCOVERY_URL`: Plain-text IP service (default
//   `http://ifconfig.me/ip`)
// - `PMDNS_DRY_RUN`: `true` to look up the record without changing it
//
// ### DreamHost
// - `DREAMHOST_API_KEY`: API key (required)
// - `DREAMHOST_RECORD_NAME`: Record to manage (required)
// - `DREAMHOST_API_ENDPOINT`: API endpoint override
//
// ## Shutdown
//
// The first SIGINT/SIGTERM cancels the pipeline and waits for it to stop.
// A second signal, or a pipeline that outlives the grace period, is fatal.
// So is a pipeline that stops without being asked to.
//
// ## Example
//
// ```bash
// export DREAMHOST_API_KEY=6SHU5P2HLDAYECUM
// export DREAMHOST_RECORD_NAME=home.example.com
//
// pmdnsd
// ```

mod config;
mod debug_vars;

use anyhow::{Context, Result};
use config::Config;
use pmdns_core::{Pipeline, PipelineEvent, StatsHandle};
use pmdns_discovery_http::HttpDiscovery;
use pmdns_registry_dreamhost::DreamhostRegistry;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum PmdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<PmdnsExitCode> for ExitCode {
    fn from(code: PmdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return PmdnsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return PmdnsExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return PmdnsExitCode::ConfigError.into();
    }

    info!(config = ?config.config_path, "starting pmdnsd");
    debug!(?config, "configuration loaded");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return PmdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            PmdnsExitCode::RuntimeError
        } else {
            PmdnsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon until shutdown
async fn run_daemon(config: Config) -> Result<()> {
    let discovery = HttpDiscovery::new(config.discovery_url.clone())
        .context("creating discovery service")?;
    let registry = DreamhostRegistry::new(
        config.dreamhost_api_key.clone(),
        config.dreamhost_record_name.clone(),
    )
    .context("creating DreamHost registry")?
    .with_endpoint(config.dreamhost_api_endpoint.clone().unwrap_or_default())
    .with_dry_run(config.dry_run);

    info!(
        discovery = %discovery.url(),
        record = %registry.record_name(),
        endpoint = %registry.endpoint(),
        dry_run = config.dry_run,
        "components ready"
    );

    // Signal handlers go in before anything starts, so an early signal
    // still takes the orderly path.
    let mut signals = Signals::new()?;

    let root = CancellationToken::new();
    let _root_guard = root.clone().drop_guard();

    let (pipeline, events) = Pipeline::start(
        Arc::new(discovery),
        Arc::new(registry),
        config.pipeline_config(),
        &root,
    )
    .context("starting pipeline")?;
    tokio::spawn(log_events(events));

    let published = StatsHandle::new();
    debug_vars::spawn_sampler(
        pipeline.stats_handle(),
        published.clone(),
        debug_vars::SAMPLE_PERIOD,
        root.clone(),
    );

    if let Some(addr) = config.debug_http_addr {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding debug endpoint on {}", addr))?;
        info!(%addr, "debug endpoint listening on /debug/vars");
        let scope = root.clone();
        tokio::spawn(async move {
            if let Err(e) = debug_vars::serve(listener, published, scope).await {
                warn!(error = %e, "debug endpoint stopped");
            }
        });
    }

    tokio::select! {
        _ = pipeline.wait() => {
            anyhow::bail!("pipeline stopped unexpectedly");
        }
        signal = signals.recv() => {
            info!(signal, "shutting down");
        }
    }

    root.cancel();

    let grace = config.shutdown_timeout();
    tokio::select! {
        _ = pipeline.wait() => {
            info!("pipeline stopped, exiting");
            Ok(())
        }
        signal = signals.recv() => {
            anyhow::bail!("received {} during shutdown", signal)
        }
        _ = tokio::time::sleep(grace) => {
            anyhow::bail!("shutdown timeout after {:?}", grace)
        }
    }
}

/// Forward pipeline events to the log
async fn log_events(mut events: mpsc::Receiver<PipelineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            PipelineEvent::UpdateFailed { ip, error } => {
                warn!(%ip, %error, "event: update failed")
            }
            PipelineEvent::Stopped { reason } => info!(%reason, "event: pipeline stopped"),
            other => debug!(event = ?other, "event"),
        }
    }
}

/// SIGTERM and SIGINT as one stream
#[cfg(unix)]
struct Signals {
    terminate: Signal,
    interrupt: Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?,
            interrupt: signal(SignalKind::interrupt())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?,
        })
    }

    /// Name of the next signal received
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.interrupt.recv() => "SIGINT",
        }
    }
}

/// Fallback for non-Unix platforms: CTRL-C only
#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to wait for CTRL-C: {}", e);
            std::future::pending::<()>().await;
        }
        "SIGINT"
    }
}
