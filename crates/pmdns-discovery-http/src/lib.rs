// # HTTP IP Discovery
//
// This crate provides an HTTP-based IP discovery service for pmdns.
//
// ## Architecture
//
// Each lookup is a single GET through the core `ResilientCaller`, so
// transport failures are retried with backoff and the lookup stops as soon
// as its scope is cancelled. The body is read up to a size limit and handed
// to a `ResponseParser`; non-200 answers become `Error::Status` with the
// parsed error body.
//
// ## Services
//
// Any service that answers with the caller's address in the body works.
// `HttpDiscovery::ifconfig_me()` is the default preset; others that behave
// the same way:
//
// - `https://api.ipify.org`
// - `https://icanhazip.com`

use pmdns_core::caller::http::{DEFAULT_BODY_LIMIT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use pmdns_core::traits::IpDiscovery;
use pmdns_core::{Error, HttpRequest, HttpTransport, ResilientCaller, Result, RetryConfig};

use std::net::IpAddr;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lookup URL used by [`HttpDiscovery::ifconfig_me`]
pub const IFCONFIG_ME_URL: &str = "http://ifconfig.me/ip";

/// Turns a response body into an address or an error message
///
/// The default methods treat the body as plain text.
pub trait ResponseParser: Send + Sync {
    /// Parse the body of a 200 response
    fn parse_body(&self, body: &[u8]) -> Result<IpAddr> {
        let text = String::from_utf8_lossy(body);
        let text = text.trim();
        text.parse()
            .map_err(|_| Error::invalid_response(format!("not an IP address: {:?}", text)))
    }

    /// Build the message for a non-200 response
    fn parse_error(&self, body: &[u8]) -> String {
        String::from_utf8_lossy(body).trim().to_string()
    }
}

/// The body is the address, surrounded by optional whitespace
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextParser;

impl ResponseParser for PlainTextParser {}

/// IP discovery over a plain HTTP GET
pub struct HttpDiscovery<P = PlainTextParser> {
    url: String,
    caller: ResilientCaller<HttpTransport>,
    parser: P,
    body_limit: usize,
}

impl<P> std::fmt::Debug for HttpDiscovery<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDiscovery")
            .field("url", &self.url)
            .field("caller", &self.caller)
            .field("body_limit", &self.body_limit)
            .finish_non_exhaustive()
    }
}

impl HttpDiscovery {
    /// Create a discovery service for `url` with default timeouts, unlimited
    /// retries and the plain-text parser
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let transport = HttpTransport::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)?;
        Ok(Self::with_transport(url, transport, RetryConfig::default()))
    }

    /// Discovery against `http://ifconfig.me/ip`
    pub fn ifconfig_me() -> Result<Self> {
        Self::new(IFCONFIG_ME_URL)
    }

    /// Create a discovery service on an existing transport
    pub fn with_transport(url: impl Into<String>, transport: HttpTransport, retry: RetryConfig) -> Self {
        Self {
            url: url.into(),
            caller: ResilientCaller::new(transport, retry).with_name("discovery"),
            parser: PlainTextParser,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl<P: ResponseParser> HttpDiscovery<P> {
    /// Replace the response parser
    pub fn with_parser<Q: ResponseParser>(self, parser: Q) -> HttpDiscovery<Q> {
        HttpDiscovery {
            url: self.url,
            caller: self.caller,
            parser,
            body_limit: self.body_limit,
        }
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl<P: ResponseParser + 'static> IpDiscovery for HttpDiscovery<P> {
    async fn get_ip(&self, scope: &CancellationToken) -> Result<IpAddr> {
        let request = HttpRequest::get(&self.url).with_body_limit(self.body_limit);
        let response = self.caller.call(scope, request).await?;

        if response.status != 200 {
            return Err(Error::status(
                response.status,
                self.parser.parse_error(&response.body),
            ));
        }

        let ip = self.parser.parse_body(&response.body)?;
        debug!(url = %self.url, %ip, "discovery: lookup answered");
        Ok(ip)
    }

    fn service_name(&self) -> &'static str {
        "http"
    }
}
