//! Debug variables endpoint
//!
//! A sampler copies the pipeline stats into a published snapshot every
//! [`SAMPLE_PERIOD`]; an axum router serves that snapshot as
//! `GET /debug/vars` → `{"DynamicIPStats": {...}}`.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use pmdns_core::StatsHandle;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// How often the published snapshot is refreshed
pub const SAMPLE_PERIOD: Duration = Duration::from_millis(731);

/// Copy `source` into `published` every `period` until `scope` ends
pub fn spawn_sampler(
    source: StatsHandle,
    published: StatsHandle,
    period: Duration,
    scope: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = scope.cancelled() => break,
                _ = interval.tick() => published.replace(source.snapshot()),
            }
        }
    })
}

/// Routes of the debug endpoint
pub fn router(published: StatsHandle) -> Router {
    Router::new()
        .route("/debug/vars", get(vars_handler))
        .with_state(published)
}

/// Serve the debug endpoint on `listener` until `scope` ends
pub async fn serve(
    listener: TcpListener,
    published: StatsHandle,
    scope: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(published))
        .with_graceful_shutdown(scope.cancelled_owned())
        .await
}

async fn vars_handler(State(published): State<StatsHandle>) -> Json<Value> {
    Json(json!({ "DynamicIPStats": published.snapshot() }))
}
