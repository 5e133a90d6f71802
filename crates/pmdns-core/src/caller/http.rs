//! reqwest-backed transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;

use crate::error::{Error, Result};
use crate::traits::Transport;

/// Default cap on how much of a response body is read (100 KiB)
pub const DEFAULT_BODY_LIMIT: usize = 100 << 10;

/// Default connect timeout for outbound HTTP
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default whole-request timeout for outbound HTTP
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Description of an HTTP request, replayed on every attempt
#[derive(Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    /// Form fields, sent url-encoded when non-empty
    pub form: Vec<(String, String)>,
    /// Maximum number of body bytes kept from the response
    pub body_limit: usize,
}

// Form values may carry credentials; only the field names are shown.
impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<&str> = self.form.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("form", &fields)
            .field("body_limit", &self.body_limit)
            .finish()
    }
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            form: Vec::new(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            form,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }
}

/// Status and (truncated) body of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, with invalid UTF-8 replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// [`Transport`] over a shared `reqwest::Client`
///
/// Any HTTP status counts as a completed exchange; only failures to talk to
/// the server at all (connect, TLS, timeouts, body read) are errors and get
/// retried by the caller. Dropping an in-flight request closes its
/// connection, so cancellation aborts the request.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client with the given connect and request timeouts
    pub fn with_timeouts(connect: Duration, request: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect)
            .timeout(request)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::new(client))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::new(client)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    type Request = HttpRequest;
    type Response = HttpResponse;

    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        let mut response = builder.send().await.map_err(|e| {
            Error::transport(format!("{} {}: {}", request.method, request.url, e))
        })?;
        let status = response.status().as_u16();

        let mut body = Vec::new();
        while body.len() < request.body_limit {
            let chunk = response
                .chunk()
                .await
                .map_err(|e| Error::transport(format!("reading response body: {}", e)))?;
            let Some(chunk) = chunk else { break };
            let room = request.body_limit - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        }

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_form_values() {
        let request = HttpRequest::post_form(
            "https://api.example.net",
            vec![
                ("key".to_string(), "super-secret-key".to_string()),
                ("cmd".to_string(), "dns-list_records".to_string()),
            ],
        );

        let debug = format!("{:?}", request);
        assert!(debug.contains("key"));
        assert!(!debug.contains("super-secret-key"));
        assert!(!debug.contains("dns-list_records"));
    }

    #[test]
    fn response_helpers() {
        let ok = HttpResponse {
            status: 200,
            body: b"198.51.100.4\n".to_vec(),
        };
        assert!(ok.is_success());
        assert_eq!(ok.text(), "198.51.100.4\n");

        let err = HttpResponse {
            status: 502,
            body: Vec::new(),
        };
        assert!(!err.is_success());
    }
}
