//! Contract Test: Registrar Debounce and Supersession
//!
//! Constraints verified:
//! - A repeat of the cached IP inside the cache window causes no remote call
//! - A repeat after the window has expired is pushed again
//! - A changed IP is pushed at once
//! - A failed update is not retried for the same IP inside the window
//! - A newer IP cancels the in-flight update of an older one
//! - At most one update is in flight at any time
//!
//! If this test fails, someone has added redundant registry calls or
//! broken the supersede-in-progress policy.

mod common;

use common::*;
use pmdns_core::tick::{self, TickSender};
use pmdns_core::{Pipeline, PipelineConfig, PipelineEvent};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Harness {
    pipeline: Pipeline,
    events: mpsc::Receiver<PipelineEvent>,
    ticks: TickSender,
}

fn start(discovery: ScriptedDiscovery, registry: RecordingRegistry, config: PipelineConfig) -> Harness {
    let (ticks, tick_rx) = tick::channel();
    let (pipeline, events) = Pipeline::start_with_ticks(
        Arc::new(discovery),
        Arc::new(registry),
        config,
        &CancellationToken::new(),
        tick_rx,
    )
    .expect("pipeline starts");
    Harness {
        pipeline,
        events,
        ticks,
    }
}

fn succeeded(expected: IpAddr) -> impl FnMut(&PipelineEvent) -> bool {
    move |e| matches!(e, PipelineEvent::UpdateSucceeded { ip } if *ip == expected)
}

fn skipped(e: &PipelineEvent) -> bool {
    matches!(e, PipelineEvent::UpdateSkipped { .. })
}

#[tokio::test(start_paused = true)]
async fn repeat_inside_window_is_skipped() {
    let registry = RecordingRegistry::new();
    let mut h = start(ScriptedDiscovery::fixed(ip(1)), registry.clone(), test_config());

    h.ticks.fire();
    wait_for(&mut h.events, succeeded(ip(1))).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    h.ticks.fire();
    let event = wait_for(&mut h.events, skipped).await;
    assert_eq!(event, PipelineEvent::UpdateSkipped { ip: ip(1) });

    assert_eq!(registry.started(), vec![ip(1)]);
    h.pipeline.shutdown();
}

#[tokio::test(start_paused = true)]
async fn repeat_after_window_is_pushed_again() {
    let registry = RecordingRegistry::new();
    let mut h = start(ScriptedDiscovery::fixed(ip(1)), registry.clone(), test_config());

    h.ticks.fire();
    wait_for(&mut h.events, succeeded(ip(1))).await;

    tokio::time::sleep(Duration::from_secs(61)).await;
    h.ticks.fire();
    let started = wait_for(&mut h.events, |e| {
        matches!(e, PipelineEvent::UpdateStarted { .. })
    })
    .await;
    assert_eq!(
        started,
        PipelineEvent::UpdateStarted {
            ip: ip(1),
            previous: Some(ip(1)),
        }
    );
    wait_for(&mut h.events, succeeded(ip(1))).await;

    assert_eq!(registry.started(), vec![ip(1), ip(1)]);
    h.pipeline.shutdown();
}

#[tokio::test(start_paused = true)]
async fn zero_window_falls_back_to_one_hour() {
    let registry = RecordingRegistry::new();
    let config = PipelineConfig {
        name_cache_ttl_secs: 0,
        ..test_config()
    };
    let mut h = start(ScriptedDiscovery::fixed(ip(1)), registry.clone(), config);

    h.ticks.fire();
    wait_for(&mut h.events, succeeded(ip(1))).await;

    tokio::time::sleep(Duration::from_secs(3599)).await;
    h.ticks.fire();
    wait_for(&mut h.events, skipped).await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    h.ticks.fire();
    wait_for(&mut h.events, succeeded(ip(1))).await;

    assert_eq!(registry.started().len(), 2);
    h.pipeline.shutdown();
}

#[tokio::test(start_paused = true)]
async fn changed_ip_is_pushed_at_once() {
    let registry = RecordingRegistry::new();
    let discovery = ScriptedDiscovery::new([Answer::ip(ip(1)), Answer::ip(ip(2))]);
    let mut h = start(discovery, registry.clone(), test_config());

    h.ticks.fire();
    wait_for(&mut h.events, succeeded(ip(1))).await;
    h.ticks.fire();
    wait_for(&mut h.events, succeeded(ip(2))).await;

    assert_eq!(registry.completed(), vec![ip(1), ip(2)]);
    h.pipeline.shutdown();
}

#[tokio::test(start_paused = true)]
async fn failed_update_waits_for_the_window() {
    let registry = RecordingRegistry::new();
    registry.set_failing(true);
    let mut h = start(ScriptedDiscovery::fixed(ip(1)), registry.clone(), test_config());

    h.ticks.fire();
    let failed = wait_for(&mut h.events, |e| {
        matches!(e, PipelineEvent::UpdateFailed { .. })
    })
    .await;
    assert!(matches!(failed, PipelineEvent::UpdateFailed { ip: got, .. } if got == ip(1)));

    h.ticks.fire();
    wait_for(&mut h.events, skipped).await;

    assert_eq!(registry.started(), vec![ip(1)]);
    assert!(!h.pipeline.is_done(), "a failed update does not stop the pipeline");
    h.pipeline.shutdown();
}

#[tokio::test(start_paused = true)]
async fn newer_ip_supersedes_in_flight_update() {
    let registry = RecordingRegistry::new().with_delay(ip(1), Duration::from_secs(10));
    let discovery = ScriptedDiscovery::new([Answer::ip(ip(1)), Answer::ip(ip(2))]);
    let mut h = start(discovery, registry.clone(), test_config());

    h.ticks.fire();
    wait_for(&mut h.events, |e| {
        matches!(e, PipelineEvent::UpdateStarted { .. })
    })
    .await;

    h.ticks.fire();
    let superseded = wait_for(&mut h.events, |e| {
        matches!(e, PipelineEvent::UpdateSuperseded { .. })
    })
    .await;
    assert_eq!(
        superseded,
        PipelineEvent::UpdateSuperseded {
            ip: ip(1),
            by: ip(2),
        }
    );

    wait_for(&mut h.events, succeeded(ip(2))).await;
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert_eq!(registry.cancelled(), vec![ip(1)]);
    assert_eq!(registry.completed(), vec![ip(2)], "only the newest value completes");
    h.pipeline.shutdown();
}

#[tokio::test(start_paused = true)]
async fn slow_update_is_cut_off_by_its_timeout() {
    let registry = RecordingRegistry::new().with_delay(ip(1), Duration::from_secs(3600));
    let mut h = start(ScriptedDiscovery::fixed(ip(1)), registry.clone(), test_config());

    h.ticks.fire();
    let failed = wait_for(&mut h.events, |e| {
        matches!(e, PipelineEvent::UpdateFailed { .. })
    })
    .await;

    assert!(matches!(failed, PipelineEvent::UpdateFailed { error, .. } if error == "scope terminated"));
    assert_eq!(registry.cancelled(), vec![ip(1)]);
    h.pipeline.shutdown();
}
