//! Failure classification for reward service responses
//!
//! The service reports most activation failures as free-form text inside an
//! `{"error": "..."}` body. Everything that does not match a known phrase
//! lands in [`FailureKind::Unknown`] instead of being guessed at.

use reqwest::StatusCode;
use std::fmt;
use thiserror::Error;

/// What went wrong with a service call, as far as retry policy cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// An activation window is already open for this account
    AlreadyActive,
    /// The server did not accept the ownership proof
    SignatureRejected,
    /// HTTP 401
    Unauthorized,
    /// Timeouts, connection failures, 5xx and unreadable payloads
    NetworkError,
    Unknown,
}

impl FailureKind {
    /// Failures that will recur every cycle until someone fixes the account
    pub fn is_persistent(self) -> bool {
        matches!(self, FailureKind::Unauthorized | FailureKind::SignatureRejected)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::AlreadyActive => "already active",
            FailureKind::SignatureRejected => "signature rejected",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::NetworkError => "network error",
            FailureKind::Unknown => "unclassified",
        };
        f.write_str(label)
    }
}

/// A failed service call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiFailure {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ApiFailure {
    pub fn new(kind: FailureKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }
}

/// Which endpoint produced a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    FetchStatus,
    SubmitActivation,
}

/// Server error phrases that map to specific activation failures.
///
/// These are the service's own wording and may change without notice, so
/// they are configuration rather than constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMatchSet {
    pub already_active: Vec<String>,
    pub signature_rejected: Vec<String>,
}

impl Default for ErrorMatchSet {
    fn default() -> Self {
        Self {
            already_active: vec!["Mining session already active".to_string()],
            signature_rejected: vec!["You must sign the message to activate mining".to_string()],
        }
    }
}

impl ErrorMatchSet {
    pub fn with_already_active(mut self, phrases: impl IntoIterator<Item = String>) -> Self {
        self.already_active.extend(phrases);
        self
    }

    pub fn with_signature_rejected(mut self, phrases: impl IntoIterator<Item = String>) -> Self {
        self.signature_rejected.extend(phrases);
        self
    }

    fn matches(phrases: &[String], text: &str) -> bool {
        phrases.iter().any(|p| p.trim() == text)
    }
}

/// Classify a non-success response.
pub fn classify_response(
    operation: Operation,
    status: StatusCode,
    body: &str,
    matches: &ErrorMatchSet,
) -> ApiFailure {
    let text = error_text(body);
    let code = Some(status.as_u16());

    if operation == Operation::SubmitActivation {
        if let Some(text) = text.as_deref() {
            if ErrorMatchSet::matches(&matches.already_active, text) {
                return ApiFailure::new(FailureKind::AlreadyActive, code, text);
            }
            if ErrorMatchSet::matches(&matches.signature_rejected, text) {
                return ApiFailure::new(FailureKind::SignatureRejected, code, text);
            }
        }
    }

    let message = text.unwrap_or_else(|| format!("HTTP {}", status));
    let kind = if status == StatusCode::UNAUTHORIZED {
        FailureKind::Unauthorized
    } else if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        FailureKind::NetworkError
    } else {
        FailureKind::Unknown
    };
    ApiFailure::new(kind, code, message)
}

/// Classify a request that never produced a response.
pub fn classify_transport(error: &reqwest::Error) -> ApiFailure {
    let message = if error.is_timeout() {
        format!("Request timed out: {}", error)
    } else if error.is_connect() {
        format!("Connection failed: {}", error)
    } else {
        error.to_string()
    };
    ApiFailure::new(
        FailureKind::NetworkError,
        error.status().map(|s| s.as_u16()),
        message,
    )
}

/// A success status whose body is not the expected shape
pub fn unexpected_payload(status: StatusCode, error: &serde_json::Error) -> ApiFailure {
    ApiFailure::new(
        FailureKind::NetworkError,
        Some(status.as_u16()),
        format!("Unexpected response payload: {}", error),
    )
}

fn error_text(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "message"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(|s| s.trim().to_string())
}
