// # pmdns-core
//
// Core library for the pmdns dynamic DNS pipeline.
//
// ## Architecture Overview
//
// A poller asks an IP discovery service for the host's public address on
// every tick. A coordinator keeps only observations newer than the last one
// it accepted. A registrar pushes changed addresses to a name registry,
// skipping repeats while its cache is warm and cancelling any update that a
// newer address overtakes.
//
// - **IpDiscovery**: Trait for learning the current public IP
// - **NameRegistry**: Trait for pointing a DNS record at an IP
// - **ResilientCaller**: Retrying, cancellable request executor shared by both
// - **Pipeline**: Supervisor that wires poller, coordinator and registrar
//
// ## Design Principles
//
// 1. **Scoped Work**: Every poll and every update runs under a cancellation
//    scope derived from the pipeline's root scope
// 2. **Newest Wins**: Stale observations and superseded updates are dropped
// 3. **No Backlog**: Ticks coalesce and each stage buffers at most one item
// 4. **Library-First**: The daemon is a thin shell around this crate

pub mod caller;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod scope;
pub mod stats;
pub mod tick;
pub mod traits;

// Re-export core types for convenience
pub use caller::{HttpRequest, HttpResponse, HttpTransport, ResilientCaller};
pub use config::{PipelineConfig, RetryConfig};
pub use error::{Error, Result};
pub use pipeline::{Observation, Pipeline, PipelineEvent};
pub use stats::{PipelineStats, StatsHandle};
pub use tick::{Tick, TickReceiver, TickSender};
pub use traits::{IpDiscovery, NameRegistry, Transport};
