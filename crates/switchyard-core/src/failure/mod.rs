//! Platform failure taxonomy.
//!
//! Every adapter failure becomes a [`PlatformError`] whose [`ErrorKind`]
//! decides whether the fallback wrapper retries on the same platform or
//! abandons it immediately.

pub mod patterns;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure category reported by (or inferred for) a platform call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    Timeout,
    ServerError { status: Option<u16> },
    Connection,
    Unauthorized,
    QuotaExhausted,
    InvalidRequest,
    Unknown,
}

impl ErrorKind {
    /// Transient failures are retried on the same platform; unknown
    /// failures are treated as transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ErrorKind::Unauthorized | ErrorKind::QuotaExhausted | ErrorKind::InvalidRequest
        )
    }

    /// Failures that point at the platform itself rather than at one
    /// task's prompt. Only these feed a platform's circuit breaker.
    pub fn is_platform_fault(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::ServerError { .. }
                | ErrorKind::Connection
                | ErrorKind::Unauthorized
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::RateLimited => write!(f, "rate limited"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::ServerError { status: Some(s) } => write!(f, "server error {}", s),
            ErrorKind::ServerError { status: None } => write!(f, "server error"),
            ErrorKind::Connection => write!(f, "connection error"),
            ErrorKind::Unauthorized => write!(f, "unauthorized"),
            ErrorKind::QuotaExhausted => write!(f, "quota exhausted"),
            ErrorKind::InvalidRequest => write!(f, "invalid request"),
            ErrorKind::Unknown => write!(f, "unknown error"),
        }
    }
}

/// A failed platform call.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct PlatformError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PlatformError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify a free-form adapter message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = classify_message(&message);
        Self { kind, message }
    }

    /// Classify an HTTP-like status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            429 => ErrorKind::RateLimited,
            408 => ErrorKind::Timeout,
            401 | 403 => ErrorKind::Unauthorized,
            402 => ErrorKind::QuotaExhausted,
            500..=599 => ErrorKind::ServerError {
                status: Some(status),
            },
            400..=499 => ErrorKind::InvalidRequest,
            _ => ErrorKind::Unknown,
        };
        Self::new(kind, message)
    }

    /// A call that exceeded its deadline.
    pub fn timeout(after: Duration) -> Self {
        Self::new(ErrorKind::Timeout, format!("timed out after {:?}", after))
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Map a message onto an [`ErrorKind`]. Unmatched messages are `Unknown`.
pub fn classify_message(message: &str) -> ErrorKind {
    if patterns::QUOTA_PATTERN.is_match(message) {
        ErrorKind::QuotaExhausted
    } else if patterns::AUTH_PATTERN.is_match(message) {
        ErrorKind::Unauthorized
    } else if patterns::RATE_LIMIT_PATTERN.is_match(message) {
        ErrorKind::RateLimited
    } else if patterns::TIMEOUT_PATTERN.is_match(message) {
        ErrorKind::Timeout
    } else if patterns::SERVER_PATTERN.is_match(message) {
        ErrorKind::ServerError {
            status: patterns::server_status(message),
        }
    } else if patterns::CONNECTION_PATTERN.is_match(message) {
        ErrorKind::Connection
    } else if patterns::INVALID_REQUEST_PATTERN.is_match(message) {
        ErrorKind::InvalidRequest
    } else {
        ErrorKind::Unknown
    }
}
