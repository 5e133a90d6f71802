//! Minimal embedding example for pmdns-core
//!
//! Runs the pipeline inside an application with its own discovery service,
//! its own registry and its own tick source. The application decides when
//! to poll and when to stop.

use async_trait::async_trait;
use pmdns_core::traits::{IpDiscovery, NameRegistry};
use pmdns_core::{Pipeline, PipelineConfig, PipelineEvent, Result, tick};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Discovery that walks through a fixed list of addresses
struct ScriptedDiscovery {
    answers: Vec<IpAddr>,
    calls: AtomicUsize,
}

impl ScriptedDiscovery {
    fn new(answers: Vec<IpAddr>) -> Self {
        Self {
            answers,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl IpDiscovery for ScriptedDiscovery {
    async fn get_ip(&self, _scope: &CancellationToken) -> Result<IpAddr> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let last = self.answers.len().saturating_sub(1);
        Ok(self.answers[n.min(last)])
    }

    fn service_name(&self) -> &'static str {
        "embedded"
    }
}

/// Registry that just remembers what it was told
#[derive(Default)]
struct MemoryRegistry {
    history: Mutex<Vec<IpAddr>>,
}

#[async_trait]
impl NameRegistry for MemoryRegistry {
    async fn set_name(&self, _scope: &CancellationToken, ip: IpAddr) -> Result<()> {
        println!("[Embedded] record -> {}", ip);
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(ip);
        Ok(())
    }

    fn registry_name(&self) -> &'static str {
        "memory"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Embedded pmdns-core Example ===\n");

    let discovery = Arc::new(ScriptedDiscovery::new(vec![
        IpAddr::from([192, 0, 2, 10]),
        IpAddr::from([192, 0, 2, 10]),
        IpAddr::from([192, 0, 2, 20]),
    ]));
    let registry = Arc::new(MemoryRegistry::default());

    println!("1. Starting pipeline on an application-owned tick source...");
    let root = CancellationToken::new();
    let (ticks, tick_rx) = tick::channel();
    let (pipeline, mut events) = Pipeline::start_with_ticks(
        discovery,
        registry.clone(),
        PipelineConfig::new(),
        &root,
        tick_rx,
    )?;

    let event_listener = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("[Event] {:?}", event);
            if matches!(event, PipelineEvent::Stopped { .. }) {
                break;
            }
        }
    });

    println!("2. Polling three times (the second answer repeats the first)...");
    for _ in 0..3 {
        ticks.fire();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    println!("3. Last poll recorded at {}", pipeline.stats().last_poll);

    println!("4. Stopping pipeline...");
    root.cancel();
    pipeline.wait().await;
    let _ = tokio::time::timeout(Duration::from_millis(100), event_listener).await;

    let history = registry
        .history
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();
    println!("\n5. Registry saw: {:?}", history);
    println!("\n=== Embedding Successful ===");
    println!("Key Points:");
    println!("- The application owns the tick source and the root scope");
    println!("- The repeated address was debounced by the registrar");

    Ok(())
}
