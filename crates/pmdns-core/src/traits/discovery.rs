// # IP Discovery Trait
//
// Defines the interface for learning the host's current public IP address.
//
// ## Implementations
//
// - HTTP lookup: `pmdns-discovery-http` crate (ifconfig.me and friends)
//
// ## Usage
//
// ```rust,ignore
// use pmdns_core::IpDiscovery;
// use tokio_util::sync::CancellationToken;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let discovery = /* IpDiscovery implementation */;
//     let scope = CancellationToken::new();
//
//     let ip = discovery.get_ip(&scope).await?;
//     println!("public ip: {}", ip);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;
use tokio_util::sync::CancellationToken;

/// Trait for IP discovery services
///
/// The poller calls [`IpDiscovery::get_ip`] once per tick, each time with a
/// fresh scope that is cancelled when the attempt times out, when a newer
/// tick supersedes it, or when the pipeline shuts down.
///
/// # Cancellation
///
/// Implementations must observe `scope`: once it is cancelled they abort any
/// in-flight work and return promptly, preferably with
/// [`Error::ScopeTerminated`](crate::Error::ScopeTerminated). Building on
/// [`ResilientCaller`](crate::caller::ResilientCaller) gives this for free.
///
/// # Responsibilities
///
/// Response parsing and validation belong to the implementation. The
/// pipeline only ever sees a parsed address or an error.
#[async_trait]
pub trait IpDiscovery: Send + Sync {
    /// Look up the current public IP address
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: The address reported by the lookup service
    /// - `Err(Error)`: Lookup failed, or `scope` ended first
    async fn get_ip(&self, scope: &CancellationToken) -> Result<IpAddr, crate::Error>;

    /// Short name used in logs
    fn service_name(&self) -> &'static str {
        "discovery"
    }
}
