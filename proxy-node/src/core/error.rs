//! Process-internal error type and its mapping onto the client-facing
//! `proxy_types::ErrorKind` taxonomy.

use crate::clients::resilient_types::ProviderErrorBody;
use proxy_types::error::{ErrorKind, ProxyError};
use std::{error::Error, fmt};

#[derive(Debug)]
pub enum NodeError {
    Invalid { field: Option<String>, message: String },
    Authentication(String),
    UnsupportedModel { requested: String, supported: Vec<String> },
    Upstream(UpstreamFailure),
    Network(String),
    Timeout(String),
    CircuitOpen { next_attempt_ms: u64 },
    ResponseSizeViolation(String),
    Configuration(String),
    Other(String),
}

/// Classified failure returned by the upstream HTTP client.
#[derive(Debug)]
pub enum UpstreamFailure {
    ClientError { upstream_type: String, message: String },
    ServerError { upstream_type: String, message: String },
    RateLimited(String),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Invalid { field, message } => match field {
                Some(field) => write!(f, "invalid request ({field}): {message}"),
                None => write!(f, "invalid request: {message}"),
            },
            NodeError::Authentication(msg) => write!(f, "authentication failure: {msg}"),
            NodeError::UnsupportedModel { requested, supported } => write!(
                f,
                "unsupported model '{requested}' (supported: {})",
                supported.join(", ")
            ),
            NodeError::Upstream(u) => write!(f, "upstream error: {u}"),
            NodeError::Network(msg) => write!(f, "network error: {msg}"),
            NodeError::Timeout(msg) => write!(f, "timeout: {msg}"),
            NodeError::CircuitOpen { next_attempt_ms } => {
                write!(f, "circuit open, retry in {next_attempt_ms}ms")
            }
            NodeError::ResponseSizeViolation(msg) => write!(f, "response integrity violation: {msg}"),
            NodeError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            NodeError::Other(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamFailure::ClientError { upstream_type, message } => {
                write!(f, "{upstream_type}: {message}")
            }
            UpstreamFailure::ServerError { upstream_type, message } => {
                write!(f, "{upstream_type}: {message}")
            }
            UpstreamFailure::RateLimited(message) => write!(f, "rate_limited: {message}"),
        }
    }
}

impl Error for NodeError {}

impl NodeError {
    /// Whether this error counts toward the circuit breaker's failure
    /// counter, per the configured `expectedErrorKinds` default set.
    pub fn is_breaker_expected(&self) -> bool {
        matches!(
            self,
            NodeError::Network(_) | NodeError::Timeout(_) | NodeError::Upstream(UpstreamFailure::ServerError { .. })
        )
    }

    /// Maps a process-internal error into the client-facing taxonomy,
    /// attaching the request's correlation id and a sanitized message.
    pub fn into_proxy_error(self, correlation_id: &str) -> ProxyError {
        let message = crate::core::sensitive::redact_sensitive(&self.to_string());
        let kind = match self {
            NodeError::Invalid { field, message: _ } => ErrorKind::InvalidRequest {
                field,
                received: None,
            },
            NodeError::Authentication(_) => ErrorKind::AuthenticationFailure,
            NodeError::UnsupportedModel { supported, .. } => {
                ErrorKind::UnsupportedModel { supported }
            }
            NodeError::Upstream(UpstreamFailure::RateLimited(_)) => ErrorKind::RateLimited,
            NodeError::Upstream(UpstreamFailure::ClientError { upstream_type, .. }) => {
                ErrorKind::UpstreamClientError { upstream_type }
            }
            NodeError::Upstream(UpstreamFailure::ServerError { upstream_type, .. }) => {
                ErrorKind::UpstreamServerError { upstream_type }
            }
            NodeError::Network(_) => ErrorKind::NetworkError,
            NodeError::Timeout(_) => ErrorKind::NetworkTimeout,
            NodeError::CircuitOpen { next_attempt_ms } => ErrorKind::CircuitOpen { next_attempt_ms },
            NodeError::ResponseSizeViolation(_) => ErrorKind::ResponseSizeViolation,
            NodeError::Configuration(_) | NodeError::Other(_) => ErrorKind::Internal,
        };
        ProxyError::new(kind, message, correlation_id)
    }
}

fn truncate_error_msg(msg: &str) -> String {
    const MAX_LEN: usize = 256;
    if msg.len() > MAX_LEN {
        let boundary = floor_char_boundary(msg, MAX_LEN);
        format!("{}...", &msg[..boundary])
    } else {
        msg.to_string()
    }
}

/// Largest byte index `<= index` that lands on a UTF-8 char boundary.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    (0..=index).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}

/// Classifies a `reqwest` transport/status error from an upstream call into
/// a `NodeError`, recovering a nicer message from non-standard provider error
/// bodies when the status indicates a client/server error.
pub fn classify_reqwest_error(err: &reqwest::Error, upstream_type: &str) -> NodeError {
    if err.is_timeout() {
        return NodeError::Timeout(truncate_error_msg(&err.to_string()));
    }
    if err.is_connect() || err.is_request() || err.is_body() {
        return NodeError::Network(truncate_error_msg(&err.to_string()));
    }
    if let Some(status) = err.status() {
        return classify_status(status.as_u16(), &err.to_string(), upstream_type);
    }
    NodeError::Network(truncate_error_msg(&err.to_string()))
}

/// Classifies an HTTP status + raw body from an upstream response.
pub fn classify_upstream_status(status: u16, body: &str, upstream_type: &str) -> NodeError {
    let message = recover_provider_message(body).unwrap_or_else(|| truncate_error_msg(body));
    classify_status(status, &message, upstream_type)
}

fn classify_status(status: u16, message: &str, upstream_type: &str) -> NodeError {
    match status {
        401 | 403 => NodeError::Authentication(message.to_string()),
        429 => NodeError::Upstream(UpstreamFailure::RateLimited(message.to_string())),
        s if s >= 500 => NodeError::Upstream(UpstreamFailure::ServerError {
            upstream_type: upstream_type.to_string(),
            message: message.to_string(),
        }),
        _ => NodeError::Upstream(UpstreamFailure::ClientError {
            upstream_type: upstream_type.to_string(),
            message: message.to_string(),
        }),
    }
}

/// Attempts to recover a human-readable message from a non-standard
/// upstream error body (FastAPI-style `detail` arrays, bare `detail`
/// strings, or the standard `{error: {message}}` envelope).
fn recover_provider_message(body: &str) -> Option<String> {
    let parsed: ProviderErrorBody = serde_json::from_str(body).ok()?;
    Some(match parsed {
        ProviderErrorBody::Standard { error } => error.message,
        ProviderErrorBody::FastApi { detail } => detail
            .into_iter()
            .map(|d| d.msg)
            .collect::<Vec<_>>()
            .join("; "),
        ProviderErrorBody::Simple { detail } => detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_server_error_as_breaker_expected() {
        let err = NodeError::Upstream(UpstreamFailure::ServerError {
            upstream_type: "api_error".into(),
            message: "boom".into(),
        });
        assert!(err.is_breaker_expected());
    }

    #[test]
    fn classifies_client_error_as_not_breaker_expected() {
        let err = NodeError::Upstream(UpstreamFailure::ClientError {
            upstream_type: "bad_request".into(),
            message: "boom".into(),
        });
        assert!(!err.is_breaker_expected());
    }

    #[test]
    fn recovers_fastapi_style_error_body() {
        let body = r#"{"detail":[{"msg":"field required","type":"value_error"}]}"#;
        let err = classify_upstream_status(422, body, "primary");
        match err {
            NodeError::Upstream(UpstreamFailure::ClientError { message, .. }) => {
                assert_eq!(message, "field required");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn maps_429_to_rate_limited_kind() {
        let err = classify_upstream_status(429, "slow down", "secondary");
        let proxy_err = err.into_proxy_error("corr-1");
        assert_eq!(proxy_err.kind, ErrorKind::RateLimited);
    }

    #[test]
    fn truncate_error_msg_does_not_panic_on_multibyte_boundary() {
        let body = "a".repeat(255) + "€€€€";
        // Byte 256 lands mid-codepoint inside the first '€'; truncation must
        // back off to a char boundary rather than slicing through it.
        let result = truncate_error_msg(&body);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn truncate_error_msg_passes_short_messages_through() {
        assert_eq!(truncate_error_msg("short"), "short");
    }
}
