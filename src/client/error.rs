//! Collaborator error types

use std::fmt;
use thiserror::Error;

/// Error at the backend boundary, with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ClientError {
    pub kind: ClientErrorKind,
    pub message: String,
    /// HTTP status, when the backend answered at all
    pub status: Option<u16>,
}

impl ClientError {
    pub fn new(kind: ClientErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Timeout, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::NotFound, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::ServerError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::InvalidRequest, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::InvalidResponse, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Unknown, message)
    }

    /// Classify a non-success response
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = error_detail(body);
        let err = match status {
            400 | 422 => Self::invalid_request(format!("Invalid request: {detail}")),
            404 => Self::not_found(format!("Not found: {detail}")),
            408 | 504 => Self::timeout(format!("Backend timed out: {detail}")),
            500..=599 => Self::server_error(format!("Server error: {detail}")),
            _ => Self::unknown(format!("HTTP {status}: {detail}")),
        };
        err.with_status(status)
    }

    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            Self::network(format!("Connection failed: {e}"))
        } else if e.is_body() || e.is_request() {
            Self::network(format!("Transfer failed: {e}"))
        } else if e.is_decode() {
            Self::invalid_response(format!("Failed to parse response: {e}"))
        } else {
            Self::unknown(format!("Request failed: {e}"))
        }
    }
}

/// The backend reports errors as `{"detail": "..."}`; fall back to the raw body
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorKind {
    /// Connection refused, reset, or dropped mid-transfer
    Network,
    /// Request or stream exceeded its time budget
    Timeout,
    /// Unknown session (404)
    NotFound,
    /// 5xx
    ServerError,
    /// 4xx other than 404
    InvalidRequest,
    /// Success status but an unreadable body
    InvalidResponse,
    Unknown,
}

impl ClientErrorKind {
    /// Worth retrying the same call unchanged
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::ServerError)
    }
}

impl fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::ServerError => "server_error",
            Self::InvalidRequest => "invalid_request",
            Self::InvalidResponse => "invalid_response",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
