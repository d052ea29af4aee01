//! HTTP client for a single upstream backend: unary and streaming Dialect-R
//! calls, bounded retry on transient failures, request/connect timeout.

use crate::clients::resilient_types::ProviderErrorBody;
use crate::config::BackendConfig;
use crate::core::error::{classify_reqwest_error, classify_upstream_status, NodeError};
use futures::Stream;
use proxy_types::domain::dialect::{UpstreamRequest, UpstreamResponse, UpstreamStreamChunk};
use std::time::Duration;

pub struct UpstreamClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    upstream_type: String,
    max_retries: u8,
}

impl UpstreamClient {
    pub fn new(backend: &BackendConfig, timeout: Duration, max_retries: u8, upstream_type: impl Into<String>) -> Result<Self, NodeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::Configuration(format!("failed to build upstream HTTP client: {e}")))?;
        Ok(Self { http, endpoint: backend.endpoint.clone(), api_key: backend.api_key.clone(), upstream_type: upstream_type.into(), max_retries })
    }

    /// Sends a unary request, retrying up to `max_retries` times on errors
    /// the breaker would also treat as expected (`Network`, `Timeout`,
    /// `Upstream(ServerError)`); 4xx responses fail without a retry.
    pub async fn send_unary(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, NodeError> {
        let mut attempt = 0u8;
        loop {
            match self.send_unary_once(request).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < self.max_retries && err.is_breaker_expected() => {
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_unary_once(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, NodeError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e, &self.upstream_type))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| classify_reqwest_error(&e, &self.upstream_type))?;

        if !status.is_success() {
            return Err(classify_upstream_status(status.as_u16(), &body, &self.upstream_type));
        }

        serde_json::from_str(&body).map_err(|e| {
            NodeError::Upstream(crate::core::error::UpstreamFailure::ServerError {
                upstream_type: self.upstream_type.clone(),
                message: format!("malformed upstream response body: {e}"),
            })
        })
    }

    /// Opens a streamed request. Retry only applies to establishing the
    /// connection; once bytes start arriving, failures surface through the
    /// chunk stream itself (the streaming state machine owns terminal
    /// framing for those).
    pub async fn send_stream(&self, request: &UpstreamRequest) -> Result<impl Stream<Item = Result<UpstreamStreamChunk, NodeError>>, NodeError> {
        let mut attempt = 0u8;
        loop {
            match self.open_stream_once(request).await {
                Ok(stream) => return Ok(stream),
                Err(err) if attempt < self.max_retries && err.is_breaker_expected() => {
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn open_stream_once(&self, request: &UpstreamRequest) -> Result<impl Stream<Item = Result<UpstreamStreamChunk, NodeError>>, NodeError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e, &self.upstream_type))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_upstream_status(status.as_u16(), &body, &self.upstream_type));
        }

        let upstream_type = self.upstream_type.clone();
        let byte_stream = response.bytes_stream();
        Ok(decode_sse_chunks(byte_stream, upstream_type))
    }

    /// Best-effort extraction of a client-facing message from a non-2xx
    /// body that did not match any of `ProviderErrorBody`'s shapes.
    pub fn recover_message(body: &str) -> Option<String> {
        serde_json::from_str::<ProviderErrorBody>(body).ok().map(|b| match b {
            ProviderErrorBody::Standard { error } => error.message,
            ProviderErrorBody::FastApi { detail } => detail.into_iter().map(|d| d.msg).collect::<Vec<_>>().join("; "),
            ProviderErrorBody::Simple { detail } => detail,
        })
    }
}

/// Decodes an SSE byte stream (`data: {...}\n\n` frames) into
/// `UpstreamStreamChunk`s. A line that fails to parse as JSON becomes a
/// chunk that `is_well_formed()` reports false for, so the streaming state
/// machine drops it without treating it as terminal.
fn decode_sse_chunks(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
    upstream_type: String,
) -> impl Stream<Item = Result<UpstreamStreamChunk, NodeError>> {
    async_stream::stream! {
        futures::pin_mut!(byte_stream);
        let mut buffer = String::new();
        while let Some(next) = futures::StreamExt::next(&mut byte_stream).await {
            let bytes = match next {
                Ok(b) => b,
                Err(e) => {
                    yield Err(classify_reqwest_error(&e, &upstream_type));
                    return;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&bytes));
            while let Some(pos) = buffer.find("\n\n") {
                let frame = buffer[..pos].to_string();
                buffer.drain(..pos + 2);
                for line in frame.lines() {
                    let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else { continue };
                    let data = data.trim();
                    if data == "[DONE]" {
                        continue;
                    }
                    match serde_json::from_str::<UpstreamStreamChunk>(data) {
                        Ok(chunk) => yield Ok(chunk),
                        Err(_) => yield Ok(UpstreamStreamChunk { id: None, object: None, output: vec![], usage: None, finish_reason: None, error: None }),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_fastapi_style_message() {
        let body = r#"{"detail":[{"msg":"bad field","type":"value_error"}]}"#;
        assert_eq!(UpstreamClient::recover_message(body), Some("bad field".to_string()));
    }

    #[test]
    fn recovers_simple_detail_string() {
        let body = r#"{"detail":"model not found"}"#;
        assert_eq!(UpstreamClient::recover_message(body), Some("model not found".to_string()));
    }

    #[test]
    fn returns_none_for_unrecognized_body() {
        assert_eq!(UpstreamClient::recover_message("not json"), None);
    }
}
