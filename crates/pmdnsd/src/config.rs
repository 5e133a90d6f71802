//! Environment configuration for pmdnsd

use anyhow::{Context, Result};
use pmdns_core::PipelineConfig;
use pmdns_discovery_http::IFCONFIG_ME_URL;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DEBUG_HTTP_ADDR: &str = "0.0.0.0:9191";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Daemon configuration
pub struct Config {
    /// Only logged at startup
    pub config_path: Option<String>,
    /// `None` disables the debug endpoint
    pub debug_http_addr: Option<SocketAddr>,
    pub poll_interval_secs: u64,
    pub name_cache_ttl_secs: Option<u64>,
    pub discovery_url: String,
    pub log_level: String,
    pub shutdown_timeout_secs: u64,
    pub dry_run: bool,
    pub dreamhost_api_key: String,
    pub dreamhost_api_endpoint: Option<String>,
    pub dreamhost_record_name: String,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("config_path", &self.config_path)
            .field("debug_http_addr", &self.debug_http_addr)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("name_cache_ttl_secs", &self.name_cache_ttl_secs)
            .field("discovery_url", &self.discovery_url)
            .field("log_level", &self.log_level)
            .field("shutdown_timeout_secs", &self.shutdown_timeout_secs)
            .field("dry_run", &self.dry_run)
            .field("dreamhost_api_key", &"<REDACTED>")
            .field("dreamhost_api_endpoint", &self.dreamhost_api_endpoint)
            .field("dreamhost_record_name", &self.dreamhost_record_name)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug_http_addr = match var("PMDNS_DEBUG_HTTP_ADDR") {
            Some(addr) if addr.trim().is_empty() => None,
            Some(addr) => Some(parse_var("PMDNS_DEBUG_HTTP_ADDR", &addr)?),
            None => Some(parse_var("PMDNS_DEBUG_HTTP_ADDR", DEFAULT_DEBUG_HTTP_ADDR)?),
        };

        Ok(Self {
            config_path: var("PMDNS_CONFIG").filter(|s| !s.is_empty()),
            debug_http_addr,
            poll_interval_secs: var("PMDNS_POLL_INTERVAL_SECS")
                .map(|s| parse_var("PMDNS_POLL_INTERVAL_SECS", &s))
                .transpose()?
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            name_cache_ttl_secs: var("PMDNS_NAME_CACHE_TTL_SECS")
                .map(|s| parse_var("PMDNS_NAME_CACHE_TTL_SECS", &s))
                .transpose()?,
            discovery_url: var("PMDNS_DISCOVERY_URL")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| IFCONFIG_ME_URL.to_string()),
            log_level: var("PMDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            shutdown_timeout_secs: var("PMDNS_SHUTDOWN_TIMEOUT_SECS")
                .map(|s| parse_var("PMDNS_SHUTDOWN_TIMEOUT_SECS", &s))
                .transpose()?
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            dry_run: var("PMDNS_DRY_RUN")
                .map(|s| parse_var::<bool>("PMDNS_DRY_RUN", &s))
                .transpose()?
                .unwrap_or(false),
            dreamhost_api_key: var("DREAMHOST_API_KEY").unwrap_or_default(),
            dreamhost_api_endpoint: var("DREAMHOST_API_ENDPOINT").filter(|s| !s.is_empty()),
            dreamhost_record_name: var("DREAMHOST_RECORD_NAME").unwrap_or_default(),
        })
    }

    /// Validate the configuration
    ///
    /// This performs comprehensive validation including:
    /// - Required field presence
    /// - Value format validation (API key, record name, URLs)
    /// - Numeric range validation
    pub fn validate(&self) -> Result<()> {
        if self.dreamhost_api_key.is_empty() {
            anyhow::bail!(
                "DREAMHOST_API_KEY is required. \
                Set it via: export DREAMHOST_API_KEY=your_key"
            );
        }

        // Check for obvious placeholder keys (common mistake)
        let key_lower = self.dreamhost_api_key.to_lowercase();
        if key_lower.contains("your_key") || key_lower.contains("replace_me") || key_lower == "key" {
            anyhow::bail!(
                "DREAMHOST_API_KEY appears to be a placeholder. \
                Use an actual API key from the DreamHost panel."
            );
        }

        if self.dreamhost_record_name.is_empty() {
            anyhow::bail!(
                "DREAMHOST_RECORD_NAME is required. \
                Set it via: export DREAMHOST_RECORD_NAME=home.example.com"
            );
        }
        validate_domain_name(&self.dreamhost_record_name)?;

        validate_http_url("PMDNS_DISCOVERY_URL", &self.discovery_url)?;
        if let Some(ref endpoint) = self.dreamhost_api_endpoint {
            validate_http_url("DREAMHOST_API_ENDPOINT", endpoint)?;
        }

        if !(10..=3600).contains(&self.poll_interval_secs) {
            anyhow::bail!(
                "PMDNS_POLL_INTERVAL_SECS must be between 10 and 3600 seconds. Got: {}",
                self.poll_interval_secs
            );
        }

        if !(1..=300).contains(&self.shutdown_timeout_secs) {
            anyhow::bail!(
                "PMDNS_SHUTDOWN_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                self.shutdown_timeout_secs
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "PMDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Pipeline settings derived from the environment
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config =
            PipelineConfig::new().with_poll_interval(Duration::from_secs(self.poll_interval_secs));
        if let Some(ttl) = self.name_cache_ttl_secs {
            config = config.with_name_cache_ttl(Duration::from_secs(ttl));
        }
        config
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{} has an invalid value: '{}'", name, value))
}

fn validate_http_url(name: &str, url: &str) -> Result<()> {
    if !url.starts_with("https://") && !url.starts_with("http://") {
        anyhow::bail!("{} must use HTTP or HTTPS scheme. Got: {}", name, url);
    }
    Ok(())
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks; catches common mistakes, not every invalid name.
fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.is_empty() {
        anyhow::bail!("Domain name cannot be empty");
    }

    // Total length limit (RFC 1035: 253 chars max)
    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }

        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric and hyphen only.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}
