// # DreamHost Name Registry
//
// This crate points a DreamHost-hosted DNS record at the host's current IP.
//
// ## Update Procedure
//
// `set_name` brings the remote record to the requested value:
//
// 1. `dns-list_records` and find the entry for the configured name and the
//    record type of the IP family (`A` or `AAAA`)
// 2. Not found: `dns-add_record`
// 3. Same value: nothing to do
// 4. Different value: `dns-remove_record` for the old value, then
//    `dns-add_record` for the new one
//
// The API has no update command, so step 4 is not atomic. Between the two
// calls the name has no record of that type; if the add fails the record
// stays missing until the next update. A failed remove is logged and the
// add still goes ahead.
//
// ## Response Limits
//
// Command responses are small and read up to 4 KiB. A record listing grows
// with the account, so `dns-list_records` gets its own, larger limit
// (100 KiB by default). A listing cut off at the limit is not valid JSON
// and fails the update.
//
// ## Security Requirements
//
// - API key NEVER appears in logs or `Debug` output
// - Registry construction fails if the key is empty
//
// ## API Reference
//
// - DreamHost API: https://help.dreamhost.com/hc/en-us/articles/217560167
// - Every call is a form POST of `key`, `cmd`, `format=json` plus the
//   command's parameters to the API endpoint

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use pmdns_core::traits::NameRegistry;
use pmdns_core::caller::http::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use pmdns_core::{Error, HttpRequest, HttpTransport, ResilientCaller, Result, RetryConfig};
use serde::Deserialize;
use serde_json::Value;
use std::net::IpAddr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default DreamHost API endpoint
pub const DEFAULT_API_ENDPOINT: &str = "https://api.dreamhost.com";

/// Maximum number of response bytes decoded per API call (4 KiB)
pub const DEFAULT_RESPONSE_LIMIT: usize = 4 << 10;

/// Maximum number of bytes decoded from a record listing (100 KiB)
pub const DEFAULT_LIST_RESPONSE_LIMIT: usize = 100 << 10;

/// One entry of a `dns-list_records` response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DnsRecord {
    pub record: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub value: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub comment: String,
}

/// DNS record type for an address family
pub fn record_type(ip: IpAddr) -> &'static str {
    match ip {
        IpAddr::V4(_) => "A",
        IpAddr::V6(_) => "AAAA",
    }
}

/// DreamHost name registry
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the registry will:
/// - Perform the `dns-list_records` lookup
/// - Log the remove/add calls it would make
/// - **NOT** modify any record
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API key.
pub struct DreamhostRegistry {
    /// DreamHost API key
    /// ⚠️ NEVER log this value
    api_key: String,

    endpoint: String,

    /// Fully qualified name of the managed record
    record_name: String,

    caller: ResilientCaller<HttpTransport>,

    response_limit: usize,

    list_response_limit: usize,

    dry_run: bool,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for DreamhostRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DreamhostRegistry")
            .field("api_key", &"<REDACTED>")
            .field("endpoint", &self.endpoint)
            .field("record_name", &self.record_name)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl DreamhostRegistry {
    /// Create a registry for `record_name` against the default endpoint
    ///
    /// # Errors
    ///
    /// `Error::Config` if the key or the record name is empty, or if the
    /// HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, record_name: impl Into<String>) -> Result<Self> {
        let transport = HttpTransport::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)?;
        Self::with_transport(api_key, record_name, transport, RetryConfig::default())
    }

    /// Create a registry on an existing transport and retry policy
    pub fn with_transport(
        api_key: impl Into<String>,
        record_name: impl Into<String>,
        transport: HttpTransport,
        retry: RetryConfig,
    ) -> Result<Self> {
        let api_key = api_key.into();
        let record_name = record_name.into();

        if api_key.trim().is_empty() {
            return Err(Error::config("DreamHost API key cannot be empty"));
        }
        if record_name.trim().is_empty() {
            return Err(Error::config("record name cannot be empty"));
        }

        Ok(Self {
            api_key,
            endpoint: DEFAULT_API_ENDPOINT.to_string(),
            record_name,
            caller: ResilientCaller::new(transport, retry).with_name("dreamhost"),
            response_limit: DEFAULT_RESPONSE_LIMIT,
            list_response_limit: DEFAULT_LIST_RESPONSE_LIMIT,
            dry_run: false,
        })
    }

    /// Use a different API endpoint; an empty string keeps the default
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        if !endpoint.is_empty() {
            self.endpoint = endpoint;
        }
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_response_limit(mut self, limit: usize) -> Self {
        self.response_limit = limit;
        self
    }

    /// Limit for `dns-list_records` responses
    pub fn with_list_response_limit(mut self, limit: usize) -> Self {
        self.list_response_limit = limit;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn record_name(&self) -> &str {
        &self.record_name
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Make one API call and return the decoded response
    ///
    /// # Errors
    ///
    /// - `Error::Api` when the response has `"result": "error"`
    /// - `Error::Json` when the (possibly truncated) body is not JSON
    /// - Whatever the resilient caller reports for transport failures
    async fn api(
        &self,
        scope: &CancellationToken,
        cmd: &str,
        params: &[(&str, String)],
        limit: usize,
    ) -> Result<Value> {
        let mut form = Vec::with_capacity(params.len() + 3);
        form.push(("format".to_string(), "json".to_string()));
        form.push(("key".to_string(), self.api_key.clone()));
        form.push(("cmd".to_string(), cmd.to_string()));
        form.extend(params.iter().map(|(k, v)| (k.to_string(), v.clone())));

        debug!(cmd, endpoint = %self.endpoint, "dreamhost: api call");
        let request = HttpRequest::post_form(&self.endpoint, form).with_body_limit(limit);
        let response = self.caller.call(scope, request).await?;

        let result: Value = serde_json::from_slice(&response.body)?;
        if result["result"] == "error" {
            return Err(Error::api(
                cmd,
                field_text(&result["data"]),
                field_text(&result["reason"]),
            ));
        }
        Ok(result)
    }

    /// All records visible to the API key
    pub async fn list_records(&self, scope: &CancellationToken) -> Result<Vec<DnsRecord>> {
        let result = self
            .api(scope, "dns-list_records", &[], self.list_response_limit)
            .await?;
        match result.get("data") {
            Some(data @ Value::Array(_)) => Ok(Vec::<DnsRecord>::deserialize(data)?),
            _ => Err(Error::invalid_response("dns-list_records: data is not a list")),
        }
    }

    /// The managed record for the family of `ip`, if present
    pub async fn find_existing(&self, scope: &CancellationToken, ip: IpAddr) -> Result<Option<DnsRecord>> {
        let wanted = record_type(ip);
        let records = self.list_records(scope).await?;
        Ok(records
            .into_iter()
            .find(|r| r.record == self.record_name && r.record_type == wanted))
    }

    async fn add_record(&self, scope: &CancellationToken, ip: IpAddr) -> Result<()> {
        let comment = format!(
            "set by pmdns at {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let params = [
            ("record", self.record_name.clone()),
            ("type", record_type(ip).to_string()),
            ("value", ip.to_string()),
            ("comment", comment),
        ];
        self.api(scope, "dns-add_record", &params, self.response_limit).await?;
        Ok(())
    }

    async fn remove_record(&self, scope: &CancellationToken, existing: &DnsRecord) -> Result<()> {
        let params = [
            ("record", self.record_name.clone()),
            ("type", existing.record_type.clone()),
            ("value", existing.value.clone()),
        ];
        self.api(scope, "dns-remove_record", &params, self.response_limit).await?;
        Ok(())
    }
}

#[async_trait]
impl NameRegistry for DreamhostRegistry {
    async fn set_name(&self, scope: &CancellationToken, ip: IpAddr) -> Result<()> {
        let mode = if self.dry_run { "DRY-RUN" } else { "LIVE" };

        let Some(existing) = self.find_existing(scope, ip).await? else {
            info!(record = %self.record_name, %ip, mode, "dreamhost: record not found, adding");
            if self.dry_run {
                return Ok(());
            }
            self.add_record(scope, ip).await?;
            info!(record = %self.record_name, %ip, "dreamhost: record added");
            return Ok(());
        };

        if existing.value == ip.to_string() {
            info!(
                record = %self.record_name,
                %ip,
                comment = %existing.comment,
                "dreamhost: no change on remote"
            );
            return Ok(());
        }

        info!(
            record = %self.record_name,
            old = %existing.value,
            new = %ip,
            mode,
            "dreamhost: replacing record"
        );
        if self.dry_run {
            return Ok(());
        }

        match self.remove_record(scope, &existing).await {
            Ok(()) => {}
            Err(e) if e.is_scope_terminated() => return Err(e),
            Err(e) => warn!(record = %self.record_name, error = %e, "dreamhost: removing old record failed"),
        }

        self.add_record(scope, ip).await?;
        info!(record = %self.record_name, %ip, "dreamhost: record updated");
        Ok(())
    }

    fn registry_name(&self) -> &'static str {
        "dreamhost"
    }
}

fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
