//! Test doubles and common utilities for pipeline contract tests
//!
//! The doubles record what the pipeline asked of them and whether their
//! scopes were cancelled, so tests can assert on behavior without any
//! network access.

#![allow(dead_code)]

use async_trait::async_trait;
use pmdns_core::error::{Error, Result};
use pmdns_core::traits::{IpDiscovery, NameRegistry, Transport};
use pmdns_core::{PipelineConfig, PipelineEvent};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub fn ip(last: u8) -> IpAddr {
    IpAddr::from([203, 0, 113, last])
}

/// Config with short timeouts suitable for tests
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::new();
    config.poll_timeout_secs = 30;
    config.update_timeout_secs = 30;
    config.name_cache_ttl_secs = 60;
    config
}

/// Wait for the first event matching `pred`, skipping others
///
/// Panics after a minute of (possibly virtual) time.
pub async fn wait_for<F>(events: &mut mpsc::Receiver<PipelineEvent>, mut pred: F) -> PipelineEvent
where
    F: FnMut(&PipelineEvent) -> bool,
{
    let found = tokio::time::timeout(Duration::from_secs(60), async {
        while let Some(event) = events.recv().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await;

    match found {
        Ok(Some(event)) => event,
        Ok(None) => panic!("event channel closed before a matching event"),
        Err(_) => panic!("timed out waiting for event"),
    }
}

/// Drain whatever events are queued right now
pub fn drain(events: &mut mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

/// One scripted discovery answer
#[derive(Clone)]
pub struct Answer {
    pub delay: Duration,
    pub result: std::result::Result<IpAddr, String>,
}

impl Answer {
    pub fn ip(ip: IpAddr) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(ip),
        }
    }

    pub fn slow(ip: IpAddr, delay: Duration) -> Self {
        Self {
            delay,
            result: Ok(ip),
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(msg.to_string()),
        }
    }
}

/// Discovery that replays a script, repeating the last answer once the
/// script runs out
#[derive(Clone)]
pub struct ScriptedDiscovery {
    script: Arc<Mutex<VecDeque<Answer>>>,
    last: Arc<Mutex<Option<Answer>>>,
    calls: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
}

impl ScriptedDiscovery {
    pub fn new(script: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            last: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
            cancelled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always answer `ip` immediately
    pub fn fixed(ip: IpAddr) -> Self {
        Self::new([Answer::ip(ip)])
    }

    pub fn push(&self, answer: Answer) {
        self.script.lock().unwrap().push_back(answer);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of calls that saw their scope cancelled before answering
    pub fn cancelled_count(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn next_answer(&self) -> Option<Answer> {
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(answer) => {
                *last = Some(answer.clone());
                Some(answer)
            }
            None => last.clone(),
        }
    }
}

#[async_trait]
impl IpDiscovery for ScriptedDiscovery {
    async fn get_ip(&self, scope: &CancellationToken) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self
            .next_answer()
            .ok_or_else(|| Error::transport("script is empty"))?;

        tokio::select! {
            _ = scope.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                Err(Error::ScopeTerminated)
            }
            _ = tokio::time::sleep(answer.delay) => {
                answer.result.map_err(Error::transport)
            }
        }
    }

    fn service_name(&self) -> &'static str {
        "scripted"
    }
}

/// Registry that records every call and can be slowed down or made to fail
#[derive(Clone, Default)]
pub struct RecordingRegistry {
    started: Arc<Mutex<Vec<IpAddr>>>,
    completed: Arc<Mutex<Vec<IpAddr>>>,
    cancelled: Arc<Mutex<Vec<IpAddr>>>,
    delays: Arc<Mutex<Vec<(IpAddr, Duration)>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every update of `ip` take `delay`
    pub fn with_delay(self, ip: IpAddr, delay: Duration) -> Self {
        self.delays.lock().unwrap().push((ip, delay));
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn started(&self) -> Vec<IpAddr> {
        self.started.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<IpAddr> {
        self.completed.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<IpAddr> {
        self.cancelled.lock().unwrap().clone()
    }

    fn delay_for(&self, ip: IpAddr) -> Duration {
        self.delays
            .lock()
            .unwrap()
            .iter()
            .find(|(candidate, _)| *candidate == ip)
            .map(|(_, delay)| *delay)
            .unwrap_or(Duration::ZERO)
    }
}

#[async_trait]
impl NameRegistry for RecordingRegistry {
    async fn set_name(&self, scope: &CancellationToken, ip: IpAddr) -> Result<()> {
        self.started.lock().unwrap().push(ip);

        tokio::select! {
            _ = scope.cancelled() => {
                self.cancelled.lock().unwrap().push(ip);
                return Err(Error::ScopeTerminated);
            }
            _ = tokio::time::sleep(self.delay_for(ip)) => {}
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::status(500, "registry unavailable"));
        }
        self.completed.lock().unwrap().push(ip);
        Ok(())
    }

    fn registry_name(&self) -> &'static str {
        "recording"
    }
}

/// Transport that fails a fixed number of times before succeeding
pub struct FlakyTransport {
    failures_left: AtomicUsize,
    attempts: Mutex<Vec<Instant>>,
}

impl FlakyTransport {
    pub fn new(failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    type Request = &'static str;
    type Response = String;

    async fn execute(&self, request: &Self::Request) -> Result<String> {
        self.attempts.lock().unwrap().push(Instant::now());
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(Error::transport("connection reset"));
        }
        Ok(format!("ok: {request}"))
    }
}

/// Transport whose requests hang for an hour and ignore cancellation
#[derive(Default)]
pub struct StuckTransport {
    abortable: bool,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl StuckTransport {
    pub fn abortable() -> Self {
        Self {
            abortable: true,
            ..Self::default()
        }
    }

    /// Reports `supports_abort() == false`, so the caller has to abandon
    /// the attempt instead of aborting it
    pub fn unabortable() -> Self {
        Self::default()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for StuckTransport {
    type Request = ();
    type Response = ();

    async fn execute(&self, _request: &()) -> Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn supports_abort(&self) -> bool {
        self.abortable
    }
}
