//! Uniform success/error envelope for external calls.
//!
//! Every call leaving the process (repository, registry, discovery,
//! serialization) reports through [`ApiResult`]. Transport failures, unexpected
//! status codes, and unparsable bodies are all converted into an [`ApiError`]
//! here, so callers never see a panic or an untyped error for an expected
//! failure mode. Logging is left to the caller.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Abstract failure category of an external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The resource or endpoint does not exist (404)
    NotFound,
    /// Missing or rejected credentials (401)
    Unauthorized,
    /// Credentials accepted but access denied (403)
    Forbidden,
    /// The server rejected the payload (400, 409, 422)
    ValidationError,
    /// The server failed (5xx)
    InternalServerError,
    /// The request never produced a response (connect, TLS, timeout)
    NetworkError,
    /// Anything else, including unparsable bodies
    UnknownError,
}

impl ErrorKind {
    /// Classify an HTTP status code.
    ///
    /// Returns `None` for 2xx statuses.
    #[must_use]
    pub fn from_status(status: u16) -> Option<Self> {
        let kind = match status {
            200..=299 => return None,
            400 | 409 | 422 => Self::ValidationError,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            500..=599 => Self::InternalServerError,
            _ => Self::UnknownError,
        };
        Some(kind)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::UnknownError => "UNKNOWN_ERROR",
        };
        f.write_str(name)
    }
}

/// A successful call: the decoded value plus the HTTP status it came with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Success<T> {
    /// Decoded response value
    pub value: T,
    /// HTTP status code (2xx)
    pub status: u16,
}

impl<T> Success<T> {
    /// Transform the value, keeping the status.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Success<U> {
        Success {
            value: f(self.value),
            status: self.status,
        }
    }
}

/// A failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    /// Failure category
    pub kind: ErrorKind,
    /// Human-readable detail (server message when available)
    pub message: String,
    /// HTTP status, absent when no response was received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ApiError {
    /// Create an error without an HTTP status.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Shorthand for a `NotFound` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Attach the HTTP status that produced this error.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Result of every external call.
///
/// Exactly one of value or error is present by construction.
pub type ApiResult<T> = Result<Success<T>, ApiError>;

/// Wrap a value as a successful result.
pub fn wrap_success<T>(value: T, status: u16) -> ApiResult<T> {
    Ok(Success { value, status })
}

/// Wrap an error category and message as a failed result.
pub fn wrap_error_code<T>(
    kind: ErrorKind,
    message: impl Into<String>,
    status: Option<u16>,
) -> ApiResult<T> {
    Err(ApiError {
        kind,
        message: message.into(),
        status,
    })
}

/// A fully read HTTP response, independent of the HTTP library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Value of the `Content-Type` header, if any
    pub content_type: Option<String>,
    /// Response body
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Create a response without a content type.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }

    /// Set the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// The request could not be completed at the transport level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Classify a response and decode its JSON body.
///
/// 2xx responses decode the body into `T`; an empty body decodes as `null`, so
/// `()` and `Option<_>` targets accept `204 No Content`.
///
/// # Errors
///
/// - transport failure: `NetworkError` without status
/// - non-2xx status: kind derived from the status, message from the body
/// - undecodable 2xx body: `UnknownError` carrying the status
pub fn wrap_response<T: DeserializeOwned>(
    raw: Result<RawResponse, TransportError>,
) -> ApiResult<T> {
    let raw = check_status(raw)?;
    let body: &[u8] = if raw.body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &raw.body
    };
    match serde_json::from_slice(body) {
        Ok(value) => wrap_success(value, raw.status),
        Err(e) => wrap_error_code(
            ErrorKind::UnknownError,
            format!("failed to parse response body: {e}"),
            Some(raw.status),
        ),
    }
}

/// Classify a response, keeping the body undecoded.
///
/// Used for binary endpoints (attachments, serialization packages).
///
/// # Errors
///
/// Same classification as [`wrap_response`], minus body decoding.
pub fn wrap_bytes(raw: Result<RawResponse, TransportError>) -> ApiResult<RawResponse> {
    let raw = check_status(raw)?;
    let status = raw.status;
    wrap_success(raw, status)
}

fn check_status(raw: Result<RawResponse, TransportError>) -> Result<RawResponse, ApiError> {
    let raw = raw.map_err(|e| ApiError::new(ErrorKind::NetworkError, e.to_string()))?;
    match ErrorKind::from_status(raw.status) {
        None => Ok(raw),
        Some(kind) => Err(ApiError::new(kind, failure_message(&raw)).with_status(raw.status)),
    }
}

/// Extract the most useful message from an error body.
///
/// AAS servers answer with `{"messages":[{"text": ...}]}`; other bodies are
/// used verbatim.
fn failure_message(raw: &RawResponse) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&raw.body) {
        let text = value
            .get("messages")
            .and_then(|m| m.as_array())
            .and_then(|m| m.first())
            .and_then(|m| m.get("text"))
            .and_then(|t| t.as_str());
        if let Some(text) = text {
            return text.to_string();
        }
    }

    let text = String::from_utf8_lossy(&raw.body);
    let text = text.trim();
    if text.is_empty() {
        format!("HTTP status {}", raw.status)
    } else {
        text.to_string()
    }
}
