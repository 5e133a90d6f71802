//! Contract Test: Resilient Caller
//!
//! Constraints verified:
//! - Transport failures are retried with a doubling delay (1ms, 2ms, 4ms, ...)
//! - A finite attempt budget ends in `RetriesExhausted`
//! - Cancelling the scope during a backoff sleep returns at once and no
//!   further attempt starts
//! - Cancelling during an attempt aborts it when the transport allows that,
//!   and abandons it in the background when it does not
//!
//! All tests run on a paused clock, so timings are exact and instant.

mod common;

use common::*;
use pmdns_core::{Error, ResilientCaller, RetryConfig};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn delays_double_between_attempts() {
    let caller = ResilientCaller::new(FlakyTransport::new(3), RetryConfig::default());

    let response = assert_ok!(caller.call(&CancellationToken::new(), "lookup").await);
    assert_eq!(response, "ok: lookup");

    let times = caller.transport().attempt_times();
    assert_eq!(times.len(), 4);

    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    for (gap, expected_ms) in gaps.iter().zip([1u64, 2, 4]) {
        let expected = Duration::from_millis(expected_ms);
        assert!(
            *gap >= expected && *gap <= expected + Duration::from_millis(1),
            "gap {:?} should be about {:?}",
            gap,
            expected
        );
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_reports_attempts_and_cause() {
    let caller = ResilientCaller::new(FlakyTransport::new(usize::MAX), RetryConfig::with_max_attempts(3));

    let err = assert_err!(caller.call(&CancellationToken::new(), "lookup").await);

    match &err {
        Error::RetriesExhausted { attempts, source } => {
            assert_eq!(*attempts, 3);
            assert!(matches!(**source, Error::Transport(_)));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
    assert_eq!(caller.transport().attempt_count(), 3);
    assert!(err.to_string().starts_with("giving up after 3 attempt(s)"));
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_sleep_stops_retrying() {
    let retry = RetryConfig {
        max_attempts: 0,
        initial_delay_ms: 10_000,
        max_delay_ms: 10_000,
    };
    let caller = ResilientCaller::new(FlakyTransport::new(usize::MAX), retry);
    let scope = CancellationToken::new();

    let call = {
        let caller = caller.clone();
        let scope = scope.clone();
        tokio::spawn(async move { caller.call(&scope, "lookup").await })
    };

    settle().await;
    assert_eq!(caller.transport().attempt_count(), 1, "first attempt ran, now sleeping");

    scope.cancel();
    let result = tokio::time::timeout(Duration::from_millis(1), call)
        .await
        .expect("call returns without waiting out the backoff")
        .unwrap();
    assert!(matches!(result, Err(Error::ScopeTerminated)));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(caller.transport().attempt_count(), 1, "no attempt after cancellation");
}

#[tokio::test(start_paused = true)]
async fn cancel_aborts_an_abortable_attempt() {
    let caller = ResilientCaller::new(StuckTransport::abortable(), RetryConfig::default());
    let scope = CancellationToken::new();

    let call = {
        let caller = caller.clone();
        let scope = scope.clone();
        tokio::spawn(async move { caller.call(&scope, ()).await })
    };

    settle().await;
    assert_eq!(caller.transport().started(), 1);

    scope.cancel();
    let result = call.await.unwrap();
    assert!(matches!(result, Err(Error::ScopeTerminated)));

    tokio::time::sleep(Duration::from_secs(7200)).await;
    assert_eq!(caller.transport().finished(), 0, "attempt was aborted");
}

#[tokio::test(start_paused = true)]
async fn unabortable_attempt_is_abandoned_not_awaited() {
    let caller = ResilientCaller::new(StuckTransport::unabortable(), RetryConfig::default());
    let scope = CancellationToken::new();

    let call = {
        let caller = caller.clone();
        let scope = scope.clone();
        tokio::spawn(async move { caller.call(&scope, ()).await })
    };

    settle().await;
    scope.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), call)
        .await
        .expect("caller returns promptly even though the transport cannot abort")
        .unwrap();
    assert!(matches!(result, Err(Error::ScopeTerminated)));
    assert_eq!(caller.transport().finished(), 0);

    // The abandoned request runs to completion in the background.
    tokio::time::sleep(Duration::from_secs(3601)).await;
    assert_eq!(caller.transport().finished(), 1);
}
