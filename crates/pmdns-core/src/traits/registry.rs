// # Name Registry Trait
//
// Defines the interface for pointing a DNS record at an IP address.
//
// ## Implementations
//
// - DreamHost API: `pmdns-registry-dreamhost` crate
//
// ## Usage
//
// ```rust,ignore
// use pmdns_core::NameRegistry;
// use tokio_util::sync::CancellationToken;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let registry = /* NameRegistry implementation */;
//     let scope = CancellationToken::new();
//
//     registry.set_name(&scope, "203.0.113.7".parse()?).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;
use tokio_util::sync::CancellationToken;

/// Trait for DNS registry implementations
///
/// The registrar decides *when* to call [`NameRegistry::set_name`]; the
/// registry decides *how* the remote record is brought to the requested
/// value (query, add, replace).
///
/// # Idempotency
///
/// The registrar already avoids redundant calls, but after its cache window
/// expires it will push the same value again. Implementations must tolerate
/// this without corrupting the remote record; checking the current remote
/// value first and doing nothing when it already matches is the expected
/// approach.
///
/// # Cancellation
///
/// `scope` is cancelled when a newer IP supersedes this update, when the
/// update times out, or on shutdown. Implementations must abort promptly.
/// Multi-step updates may be interrupted between steps.
///
/// # No Retry Logic
///
/// Business-level failures are returned, not retried. The registrar does not
/// retry either; the next distinct (or expired) observation is the retry.
/// Transport-level retries belong in the resilient caller.
#[async_trait]
pub trait NameRegistry: Send + Sync {
    /// Point the managed record at `ip`
    async fn set_name(&self, scope: &CancellationToken, ip: IpAddr) -> Result<(), crate::Error>;

    /// Short name used in logs
    fn registry_name(&self) -> &'static str {
        "registry"
    }
}
