//! Shared response-building helpers used by both dialect handlers.

use crate::core::error::NodeError;
use crate::core::normalize::NormalizerConfig;
use crate::core::processor::ProcessorConfig;
use crate::core::reasoning::AnalyzerConfig;
use crate::core::state::AppState;
use crate::transform::{dialect_a, dialect_o};
use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use proxy_types::domain::dialect::DialectFormat;
use proxy_types::error::{ErrorKind, ProxyError};
use serde_json::Value;

pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn processor_config(state: &AppState) -> ProcessorConfig<'_> {
    ProcessorConfig {
        normalizer: NormalizerConfig {
            max_request_size: state.config.max_request_size,
            enable_content_security_validation: state.config.enable_content_security_validation,
        },
        analyzer: AnalyzerConfig {
            default_reasoning_effort: state.config.default_reasoning_effort,
            domain_boost_keywords: vec![],
            domain_boost_enabled: false,
        },
        start_time: state.start_time,
        manager: &state.conversation_manager,
        multi_turn: &state.multi_turn,
        router: &state.router,
    }
}

fn error_body(format: DialectFormat, err: &ProxyError) -> Value {
    match format {
        DialectFormat::DialectA => dialect_a::error_envelope(err),
        DialectFormat::DialectO => dialect_o::error_envelope(err),
    }
}

pub fn insert_correlation_header(response: &mut Response, correlation_id: &str) {
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        response.headers_mut().insert("x-correlation-id", value);
    }
}

/// Maps a `NodeError` onto the dialect-shaped error envelope and HTTP
/// status mandated by the error taxonomy, stamping the correlation header.
pub fn error_response(format: DialectFormat, err: NodeError, correlation_id: &str) -> Response {
    let proxy_err = err.into_proxy_error(correlation_id);
    proxy_error_response(format, proxy_err)
}

pub fn auth_error_response(format: DialectFormat, correlation_id: &str) -> Response {
    let proxy_err = ProxyError::new(ErrorKind::AuthenticationFailure, "missing or invalid credentials", correlation_id);
    proxy_error_response(format, proxy_err)
}

fn proxy_error_response(format: DialectFormat, proxy_err: ProxyError) -> Response {
    let status = StatusCode::from_u16(proxy_err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let correlation_id = proxy_err.correlation_id.clone();
    let body = error_body(format, &proxy_err);
    let mut response = (status, Json(body)).into_response();
    insert_correlation_header(&mut response, &correlation_id);
    response
}
