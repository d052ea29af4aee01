//! Streaming state machine: translates an upstream Dialect-R chunk
//! stream into client-dialect SSE frames.
//!
//! `Initial -> Opened -> Streaming -> {Completed | Errored | Cancelled}`.
//! The machine is single-owner per stream: the upstream read loop and the
//! client write loop run on the same task, so emitted frame order mirrors
//! upstream chunk order.

use crate::core::error::NodeError;
use crate::transform::{dialect_a, dialect_o};
use futures::Stream;
use proxy_types::domain::dialect::{DialectFormat, UpstreamStreamChunk};
use proxy_types::error::ProxyError;
use serde_json::Value;

/// One SSE frame ready for the wire: a JSON payload, or the Dialect-O
/// `[DONE]` sentinel that follows its terminal chunk.
pub enum Frame {
    Json(Value),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    Streaming,
    Terminal,
}

/// Drives one stream to completion, yielding `Frame`s in order. `upstream`
/// yields `Ok(chunk)` per received chunk or `Err` on a transport failure;
/// ending the stream without a terminal chunk and without an error is
/// treated as a client-observed cancellation.
pub fn translate(
    format: DialectFormat,
    id: String,
    public_model_label: String,
    upstream: impl Stream<Item = Result<UpstreamStreamChunk, NodeError>> + Send + 'static,
    correlation_id: String,
) -> impl Stream<Item = Frame> {
    async_stream::stream! {
        futures::pin_mut!(upstream);
        let mut state = State::Initial;
        let mut prompt_tokens: u32 = 0;
        let mut completion_tokens: u32 = 0;

        while let Some(item) = futures::StreamExt::next(&mut upstream).await {
            if state == State::Terminal {
                break;
            }

            let chunk = match item {
                Ok(chunk) => chunk,
                Err(err) => {
                    for frame in error_frames(format, err, &correlation_id) {
                        yield frame;
                    }
                    state = State::Terminal;
                    break;
                }
            };

            if !chunk.is_well_formed() {
                continue;
            }

            if let Some(usage) = &chunk.usage {
                prompt_tokens = usage.prompt_tokens;
                completion_tokens = usage.completion_tokens;
            }

            if let Some(upstream_error) = &chunk.error {
                let err = NodeError::Upstream(crate::core::error::UpstreamFailure::ServerError {
                    upstream_type: upstream_error.r#type.clone().unwrap_or_else(|| "api_error".to_string()),
                    message: upstream_error.message.clone(),
                });
                for frame in error_frames(format, err, &correlation_id) {
                    yield frame;
                }
                state = State::Terminal;
                break;
            }

            if state == State::Initial {
                for frame in opening_frames(format, &id, &public_model_label) {
                    yield frame;
                }
                state = State::Streaming;
            }

            if let Some(text) = chunk.delta_text() {
                yield delta_frame(format, &id, &public_model_label, &text);
            }

            if chunk.is_terminal() {
                for frame in terminal_frames(format, &id, &public_model_label, prompt_tokens, completion_tokens) {
                    yield frame;
                }
                state = State::Terminal;
                break;
            }
        }

        // Transport EOF (or client cancellation surfaced as stream end)
        // before a terminal chunk arrived: still owe exactly one terminal
        // frame so the client's parser is not left hanging.
        if state != State::Terminal {
            if state == State::Initial {
                for frame in opening_frames(format, &id, &public_model_label) {
                    yield frame;
                }
            }
            for frame in terminal_frames(format, &id, &public_model_label, prompt_tokens, completion_tokens) {
                yield frame;
            }
        }
    }
}

/// On the first upstream chunk, Dialect-A emits `message_start` and
/// `content_block_start(0)`; Dialect-O emits a single opening chunk with
/// `delta.role="assistant"`.
fn opening_frames(format: DialectFormat, id: &str, public_model_label: &str) -> Vec<Frame> {
    match format {
        DialectFormat::DialectA => vec![
            Frame::Json(dialect_a::message_start(id, public_model_label)),
            Frame::Json(dialect_a::content_block_start(0)),
        ],
        DialectFormat::DialectO => vec![Frame::Json(dialect_o::opening_chunk(id, 0, public_model_label))],
    }
}

fn delta_frame(format: DialectFormat, id: &str, public_model_label: &str, text: &str) -> Frame {
    match format {
        DialectFormat::DialectA => Frame::Json(dialect_a::content_block_delta(0, text)),
        DialectFormat::DialectO => Frame::Json(dialect_o::delta_chunk(id, 0, public_model_label, text)),
    }
}

/// `content_block_stop` (Dialect-A only) then the terminal frame.
fn terminal_frames(format: DialectFormat, id: &str, public_model_label: &str, prompt_tokens: u32, completion_tokens: u32) -> Vec<Frame> {
    match format {
        DialectFormat::DialectA => vec![
            Frame::Json(dialect_a::content_block_stop(0)),
            Frame::Json(dialect_a::message_stop(prompt_tokens, completion_tokens)),
        ],
        DialectFormat::DialectO => vec![
            Frame::Json(dialect_o::terminal_chunk(id, 0, public_model_label)),
            Frame::Done,
        ],
    }
}

fn error_frames(format: DialectFormat, err: NodeError, correlation_id: &str) -> Vec<Frame> {
    let proxy_err: ProxyError = err.into_proxy_error(correlation_id);
    let error_frame = match format {
        DialectFormat::DialectA => Frame::Json(dialect_a::error_envelope(&proxy_err)),
        DialectFormat::DialectO => Frame::Json(dialect_o::error_envelope(&proxy_err)),
    };
    match format {
        DialectFormat::DialectA => vec![error_frame, Frame::Json(dialect_a::content_block_stop(0))],
        DialectFormat::DialectO => vec![error_frame, Frame::Done],
    }
}

/// Adapts a `Frame` stream into the axum SSE wire type: a JSON frame
/// becomes a `data:` event, `Done` becomes the Dialect-O `[DONE]` sentinel.
pub fn into_sse_stream(frames: impl Stream<Item = Frame>) -> impl Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>> {
    futures::StreamExt::map(frames, |frame| {
        let data = match frame {
            Frame::Json(v) => serde_json::to_string(&v).unwrap_or_default(),
            Frame::Done => "[DONE]".to_string(),
        };
        Ok(axum::response::sse::Event::default().data(data))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_types::domain::dialect::OutputItem;
    use proxy_types::domain::message::TokenUsage;

    fn text_chunk(text: &str) -> UpstreamStreamChunk {
        UpstreamStreamChunk {
            id: Some("c1".into()),
            object: Some("response.chunk".into()),
            output: vec![OutputItem::Text { text: text.into() }],
            usage: None,
            finish_reason: None,
            error: None,
        }
    }

    fn terminal_chunk() -> UpstreamStreamChunk {
        UpstreamStreamChunk {
            id: Some("c1".into()),
            object: Some("response.chunk".into()),
            output: vec![OutputItem::Reasoning { status: Some("completed".into()) }],
            usage: Some(TokenUsage { prompt_tokens: 3, completion_tokens: 5, total_tokens: 8, reasoning_tokens: None }),
            finish_reason: Some("stop".into()),
            error: None,
        }
    }

    fn malformed_chunk() -> UpstreamStreamChunk {
        UpstreamStreamChunk { id: None, object: Some("response.chunk".into()), output: vec![], usage: None, finish_reason: None, error: None }
    }

    async fn collect(format: DialectFormat, chunks: Vec<Result<UpstreamStreamChunk, NodeError>>) -> Vec<Frame> {
        let s = translate(format, "resp-1".into(), "gpt-5-codex".into(), futures::stream::iter(chunks), "corr-1".into());
        futures::StreamExt::collect(s).await
    }

    #[tokio::test]
    async fn dialect_a_emits_start_deltas_and_stop_in_order() {
        let frames = collect(DialectFormat::DialectA, vec![Ok(text_chunk("hi")), Ok(terminal_chunk())]).await;
        assert_eq!(frames.len(), 5);
        assert!(matches!(&frames[0], Frame::Json(v) if v["type"] == "message_start"));
        assert!(matches!(&frames[1], Frame::Json(v) if v["type"] == "content_block_start"));
        assert!(matches!(&frames[2], Frame::Json(v) if v["type"] == "content_block_delta" && v["delta"]["text"] == "hi"));
        assert!(matches!(&frames[3], Frame::Json(v) if v["type"] == "content_block_stop"));
        assert!(matches!(&frames[4], Frame::Json(v) if v["type"] == "message_stop"));
    }

    #[tokio::test]
    async fn dialect_a_emits_message_stop_after_block_stop() {
        let frames = collect(DialectFormat::DialectA, vec![Ok(text_chunk("hi")), Ok(terminal_chunk())]).await;
        // content_block_start, content_block_delta already asserted above; check tail ordering.
        let tail: Vec<&str> = frames.iter().filter_map(|f| match f {
            Frame::Json(v) => v["type"].as_str(),
            Frame::Done => None,
        }).collect();
        assert_eq!(tail.last(), Some(&"message_stop"));
    }

    #[tokio::test]
    async fn dialect_o_ends_with_done_sentinel() {
        let frames = collect(DialectFormat::DialectO, vec![Ok(text_chunk("hi")), Ok(terminal_chunk())]).await;
        assert!(matches!(frames.last(), Some(Frame::Done)));
        let second_last = &frames[frames.len() - 2];
        assert!(matches!(second_last, Frame::Json(v) if v["choices"][0]["finish_reason"] == "stop"));
    }

    #[tokio::test]
    async fn malformed_chunk_is_dropped_without_terminating() {
        let frames = collect(DialectFormat::DialectA, vec![Ok(malformed_chunk()), Ok(text_chunk("ok")), Ok(terminal_chunk())]).await;
        let deltas: Vec<&Value> = frames.iter().filter_map(|f| match f {
            Frame::Json(v) if v["type"] == "content_block_delta" => Some(v),
            _ => None,
        }).collect();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0]["delta"]["text"], "ok");
    }

    #[tokio::test]
    async fn transport_eof_without_terminal_chunk_still_emits_exactly_one_terminal_frame() {
        let frames = collect(DialectFormat::DialectA, vec![Ok(text_chunk("partial"))]).await;
        let stops = frames.iter().filter(|f| matches!(f, Frame::Json(v) if v["type"] == "message_stop")).count();
        assert_eq!(stops, 1);
    }

    #[tokio::test]
    async fn transport_error_emits_error_then_single_terminal_frame() {
        let frames = collect(DialectFormat::DialectO, vec![Ok(text_chunk("hi")), Err(NodeError::Network("boom".into()))]).await;
        assert!(matches!(frames.last(), Some(Frame::Done)));
        let errors = frames.iter().filter(|f| matches!(f, Frame::Json(v) if v.get("error").is_some())).count();
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn no_frames_emitted_after_terminal() {
        let frames = collect(DialectFormat::DialectA, vec![Ok(terminal_chunk()), Ok(text_chunk("late"))]).await;
        let deltas = frames.iter().filter(|f| matches!(f, Frame::Json(v) if v["type"] == "content_block_delta")).count();
        assert_eq!(deltas, 0);
    }
}
