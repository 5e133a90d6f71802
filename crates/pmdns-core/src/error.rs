//! Error types for the pmdns pipeline
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for pmdns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the pmdns pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// The cancellation scope ended (shutdown, supersession or timeout)
    /// before the operation could complete
    #[error("scope terminated")]
    ScopeTerminated,

    /// Transport-level failure (connect, TLS, read)
    #[error("transport error: {0}")]
    Transport(String),

    /// Every allowed attempt failed at the transport level
    #[error("giving up after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// The last transport failure
        #[source]
        source: Box<Error>,
    },

    /// A remote service answered with an unexpected HTTP status
    #[error("{status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Parsed error body
        message: String,
    },

    /// The registry API reported a domain-level failure
    #[error("{}", api_message(.cmd, .data, .reason))]
    Api {
        /// API command that failed
        cmd: String,
        /// `data` field of the response, if any
        data: Option<String>,
        /// `reason` field of the response, if any
        reason: Option<String>,
    },

    /// A remote service returned a body that could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

fn api_message(cmd: &str, data: &Option<String>, reason: &Option<String>) -> String {
    match (data, reason) {
        (None, None) => format!("{}: unknown_error", cmd),
        (Some(data), None) => format!("{}: {}", cmd, data),
        (data, Some(reason)) => format!("{}: {} -- {}", cmd, data.as_deref().unwrap_or(""), reason),
    }
}

impl Error {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an HTTP status error
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Create a registry API error
    pub fn api(cmd: impl Into<String>, data: Option<String>, reason: Option<String>) -> Self {
        Self::Api {
            cmd: cmd.into(),
            data,
            reason,
        }
    }

    /// Create an invalid response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True when the error only reports that the surrounding scope ended
    pub fn is_scope_terminated(&self) -> bool {
        matches!(self, Self::ScopeTerminated)
    }
}
