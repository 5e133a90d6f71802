//! Core traits for the pmdns pipeline
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpDiscovery`]: Learn the current public IP address
//! - [`NameRegistry`]: Point a DNS record at an IP address
//! - [`Transport`]: Execute one network request for the resilient caller

pub mod discovery;
pub mod registry;
pub mod transport;

pub use discovery::IpDiscovery;
pub use registry::NameRegistry;
pub use transport::Transport;
