//! Coalescing tick source
//!
//! Ticks drive the poll cadence. The buffer between producer and consumer
//! holds a single tick: firing while a tick is already pending is a no-op,
//! so a slow consumer sees at most one stale tick and never a backlog.
//!
//! Dropping every [`TickSender`] closes the source, which is the documented
//! way to stop the poller.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A request to poll, stamped with when it was fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub fired_at: Instant,
}

impl Tick {
    pub fn now() -> Self {
        Self {
            fired_at: Instant::now(),
        }
    }
}

/// Create a coalescing tick channel (capacity 1)
pub fn channel() -> (TickSender, TickReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (TickSender { tx }, TickReceiver { rx })
}

/// Producing half of a tick channel
#[derive(Debug, Clone)]
pub struct TickSender {
    tx: mpsc::Sender<Tick>,
}

impl TickSender {
    /// Fire a tick without waiting
    ///
    /// Returns `false` when the tick was dropped, either because one is
    /// already pending or because the receiver is gone.
    pub fn fire(&self) -> bool {
        match self.tx.try_send(Tick::now()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!("tick coalesced into the pending one");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consuming half of a tick channel
#[derive(Debug)]
pub struct TickReceiver {
    rx: mpsc::Receiver<Tick>,
}

impl TickReceiver {
    /// Wait for the next tick; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<Tick> {
        self.rx.recv().await
    }
}

/// Fire `sender` every `period` until `scope` is cancelled
///
/// The first tick comes one full period after the call; callers that want
/// an immediate poll fire once themselves. The sender is dropped when the
/// task ends, closing the source.
pub fn spawn_interval(
    sender: TickSender,
    period: Duration,
    scope: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);

        loop {
            tokio::select! {
                _ = scope.cancelled() => break,
                Some(_) = ticks.next() => {
                    sender.fire();
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pending_tick_absorbs_later_ones() {
        let (tx, mut rx) = channel();

        assert!(tx.fire());
        for _ in 0..4 {
            assert!(!tx.fire());
        }

        assert!(rx.recv().await.is_some());
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_fires_after_each_period() {
        let (tx, mut rx) = channel();
        let scope = CancellationToken::new();
        let feeder = spawn_interval(tx, Duration::from_secs(30), scope.clone());

        let start = Instant::now();
        let first = rx.recv().await.unwrap();
        assert!(first.fired_at - start >= Duration::from_secs(30));

        let second = rx.recv().await.unwrap();
        assert!(second.fired_at - first.fired_at >= Duration::from_secs(30));

        scope.cancel();
        feeder.await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
