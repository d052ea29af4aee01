use serde::{Deserialize, Serialize};
use std::fmt;

/// The error taxonomy surfaced to clients and used to drive HTTP status codes,
/// circuit breaker bookkeeping, and retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ErrorKind {
    InvalidRequest { field: Option<String>, received: Option<String> },
    AuthenticationFailure,
    UnsupportedModel { supported: Vec<String> },
    RateLimited,
    UpstreamClientError { upstream_type: String },
    UpstreamServerError { upstream_type: String },
    NetworkError,
    NetworkTimeout,
    CircuitOpen { next_attempt_ms: u64 },
    ResponseSizeViolation,
    Internal,
}

impl ErrorKind {
    /// Maps a kind to its corresponding HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::InvalidRequest { .. } => 400,
            ErrorKind::AuthenticationFailure => 401,
            ErrorKind::UnsupportedModel { .. } => 400,
            ErrorKind::RateLimited => 429,
            ErrorKind::UpstreamClientError { .. } => 400,
            ErrorKind::UpstreamServerError { .. } => 500,
            ErrorKind::NetworkError => 503,
            ErrorKind::NetworkTimeout => 504,
            ErrorKind::CircuitOpen { .. } => 503,
            ErrorKind::ResponseSizeViolation => 500,
            ErrorKind::Internal => 500,
        }
    }

    /// Whether this kind counts against a circuit breaker's expected-error filter
    /// by default (see `expectedErrorKinds` in the configuration surface).
    pub fn is_breaker_expected_by_default(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkError | ErrorKind::NetworkTimeout | ErrorKind::UpstreamServerError { .. }
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidRequest { field, .. } => match field {
                Some(field) => write!(f, "invalid request: {field}"),
                None => write!(f, "invalid request"),
            },
            ErrorKind::AuthenticationFailure => write!(f, "authentication failure"),
            ErrorKind::UnsupportedModel { supported } => {
                write!(f, "unsupported model (supported: {})", supported.join(", "))
            }
            ErrorKind::RateLimited => write!(f, "rate limited"),
            ErrorKind::UpstreamClientError { upstream_type } => {
                write!(f, "upstream client error: {upstream_type}")
            }
            ErrorKind::UpstreamServerError { upstream_type } => {
                write!(f, "upstream server error: {upstream_type}")
            }
            ErrorKind::NetworkError => write!(f, "network error"),
            ErrorKind::NetworkTimeout => write!(f, "network timeout"),
            ErrorKind::CircuitOpen { next_attempt_ms } => {
                write!(f, "circuit open, next attempt in {next_attempt_ms}ms")
            }
            ErrorKind::ResponseSizeViolation => write!(f, "response size violation"),
            ErrorKind::Internal => write!(f, "internal error"),
        }
    }
}

/// A fully formed proxy error: a kind plus a sanitized, client-safe message
/// and the correlation id of the request that produced it.
#[derive(Debug, Clone)]
pub struct ProxyError {
    pub kind: ErrorKind,
    pub message: String,
    pub correlation_id: String,
}

impl ProxyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            correlation_id: correlation_id.into(),
        }
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.kind, self.correlation_id, self.message)
    }
}

impl std::error::Error for ProxyError {}

pub type ProxyResult<T> = Result<T, ProxyError>;
