//! Validates and canonicalizes a detected request body into a
//! `NormalizedRequest`, enforcing size limits, structural/range checks, an
//! optional content-security screen, and text sanitization.

use crate::core::error::NodeError;
use proxy_types::domain::dialect::{
    ContentBlock, DialectFormat, MessageContent, MessageRole, NormalizedMessage, NormalizedRequest, SamplingParams,
};
use proxy_types::domain::tool::Tool;
use regex::Regex;
use serde_json::Value;

const MAX_OUTPUT_TOKENS_CEILING: u64 = 131_072;

const EVENT_HANDLER_ATTRS: &[&str] =
    &["click", "load", "error", "focus", "blur", "change", "submit", "keydown", "keyup", "mouseover", "mouseout"];

pub struct NormalizerConfig {
    pub max_request_size: usize,
    pub enable_content_security_validation: bool,
}

fn invalid(field: &str, message: impl Into<String>) -> NodeError {
    NodeError::Invalid { field: Some(field.to_string()), message: message.into() }
}

pub fn normalize(body: &Value, format: DialectFormat, config: &NormalizerConfig) -> Result<NormalizedRequest, NodeError> {
    let serialized = serde_json::to_vec(body).map_err(|e| invalid("body", e.to_string()))?;
    if serialized.len() > config.max_request_size {
        return Err(invalid("body", format!("request exceeds maximum size of {} bytes", config.max_request_size)));
    }

    let obj = body.as_object().ok_or_else(|| invalid("body", "request body must be a JSON object"))?;

    if config.enable_content_security_validation {
        screen_for_content_security(body, "$")?;
    }

    let model = obj
        .get("model")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("model", "model is required and must be a non-empty string"))?
        .to_string();

    let mut messages = parse_messages(obj, format)?;
    if messages.is_empty() {
        return Err(invalid("messages", "messages must be a non-empty array"));
    }
    for message in &mut messages {
        sanitize_message(message);
    }

    let system = match obj.get("system") {
        None => None,
        Some(Value::String(s)) => Some(sanitize_text(s)),
        Some(_) => return Err(invalid("system", "system must be a string")),
    };

    let sampling = parse_sampling(obj)?;
    let stream = match obj.get("stream") {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(invalid("stream", "stream must be a boolean")),
    };
    let tools = parse_tools(obj)?;

    Ok(NormalizedRequest { format, model, messages, system, sampling, stream, tools })
}

fn parse_messages(obj: &serde_json::Map<String, Value>, format: DialectFormat) -> Result<Vec<NormalizedMessage>, NodeError> {
    if let Some(prompt) = obj.get("prompt").and_then(Value::as_str) {
        if !obj.contains_key("messages") {
            return Ok(vec![NormalizedMessage {
                role: MessageRole::User,
                content: MessageContent::Text(prompt.to_string()),
            }]);
        }
    }

    let raw_messages = obj
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("messages", "messages must be a non-empty array"))?;

    raw_messages.iter().map(|m| parse_message(m, format)).collect()
}

fn parse_message(value: &Value, _format: DialectFormat) -> Result<NormalizedMessage, NodeError> {
    let role_str = value
        .get("role")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("messages[].role", "role is required"))?;
    let role = match role_str {
        "user" => MessageRole::User,
        "assistant" => MessageRole::Assistant,
        "system" => MessageRole::System,
        other => return Err(invalid("messages[].role", format!("unknown role '{other}'"))),
    };

    let content_value = value
        .get("content")
        .ok_or_else(|| invalid("messages[].content", "content is required"))?;
    let content = match content_value {
        Value::String(s) => MessageContent::Text(s.clone()),
        Value::Array(blocks) => {
            let parsed = blocks
                .iter()
                .map(|b| {
                    let text = b
                        .get("text")
                        .and_then(Value::as_str)
                        .ok_or_else(|| invalid("messages[].content[].text", "text block requires a text field"))?;
                    Ok(ContentBlock::Text { text: text.to_string() })
                })
                .collect::<Result<Vec<_>, NodeError>>()?;
            MessageContent::Blocks(parsed)
        }
        _ => return Err(invalid("messages[].content", "content must be a string or an array of blocks")),
    };

    Ok(NormalizedMessage { role, content })
}

fn parse_sampling(obj: &serde_json::Map<String, Value>) -> Result<SamplingParams, NodeError> {
    let temperature = match obj.get("temperature") {
        None => None,
        Some(v) => {
            let t = v.as_f64().ok_or_else(|| invalid("temperature", "temperature must be a number"))?;
            if !(0.0..=2.0).contains(&t) {
                return Err(invalid("temperature", "temperature must be within [0, 2]"));
            }
            Some(t as f32)
        }
    };

    let top_p = match obj.get("top_p") {
        None => None,
        Some(v) => {
            let p = v.as_f64().ok_or_else(|| invalid("top_p", "top_p must be a number"))?;
            if !(0.0..=1.0).contains(&p) {
                return Err(invalid("top_p", "top_p must be within [0, 1]"));
            }
            Some(p as f32)
        }
    };

    let max_output_tokens = parse_token_cap(obj, "max_completion_tokens")?.or(parse_token_cap(obj, "max_tokens")?);

    Ok(SamplingParams { temperature, top_p, max_output_tokens })
}

fn parse_token_cap(obj: &serde_json::Map<String, Value>, field: &'static str) -> Result<Option<u32>, NodeError> {
    match obj.get(field) {
        None => Ok(None),
        Some(v) => {
            let n = v.as_u64().ok_or_else(|| invalid(field, "must be a positive integer"))?;
            if n < 1 || n > MAX_OUTPUT_TOKENS_CEILING {
                return Err(invalid(field, format!("must be within [1, {MAX_OUTPUT_TOKENS_CEILING}]")));
            }
            Ok(Some(n as u32))
        }
    }
}

fn parse_tools(obj: &serde_json::Map<String, Value>) -> Result<Vec<Tool>, NodeError> {
    match obj.get("tools") {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.iter().map(|raw| Tool { raw: raw.clone() }).collect()),
        Some(_) => Err(invalid("tools", "tools must be an array")),
    }
}

fn sanitize_message(message: &mut NormalizedMessage) {
    message.content = match &message.content {
        MessageContent::Text(text) => MessageContent::Text(sanitize_text(text)),
        MessageContent::Blocks(blocks) => MessageContent::Blocks(
            blocks
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => ContentBlock::Text { text: sanitize_text(text) },
                })
                .collect(),
        ),
    };
}

/// Strips `<script>` blocks, strips remaining tags while preserving their
/// text, and strips ASCII control characters except tab/newline. If
/// sanitization would empty a previously non-empty string, the original is
/// preserved instead.
fn sanitize_text(input: &str) -> String {
    if input.is_empty() {
        return input.to_string();
    }
    let script_re = Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("static regex");
    let without_scripts = script_re.replace_all(input, "");
    let tag_re = Regex::new(r"<[^>]+>").expect("static regex");
    let without_tags = tag_re.replace_all(&without_scripts, "");
    let cleaned: String = without_tags
        .chars()
        .filter(|c| !c.is_control() || *c == '\t' || *c == '\n')
        .collect();

    if cleaned.trim().is_empty() { input.to_string() } else { cleaned }
}

/// Recursively screens every string field of `value` against the closed set
/// of content-security patterns, returning the path of the first match.
fn screen_for_content_security(value: &Value, path: &str) -> Result<(), NodeError> {
    match value {
        Value::String(s) => {
            if let Some(reason) = detect_content_security_violation(s) {
                return Err(invalid(path, format!("content rejected: {reason}")));
            }
            Ok(())
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                screen_for_content_security(item, &format!("{path}[{i}]"))?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for (key, item) in map {
                screen_for_content_security(item, &format!("{path}.{key}"))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn detect_content_security_violation(value: &str) -> Option<&'static str> {
    let script_re = Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("static regex");
    if script_re.is_match(value) {
        return Some("script tag");
    }
    let js_proto_re = Regex::new(r"(?i)(^|\s)javascript:").expect("static regex");
    if js_proto_re.is_match(value) {
        return Some("javascript: protocol");
    }
    if Regex::new(r"(?i)^data:text/").expect("static regex").is_match(value.trim_start()) {
        return Some("data:text/ uri");
    }
    for attr in EVENT_HANDLER_ATTRS {
        let attr_re = Regex::new(&format!(r"(?i)\son{attr}\s*=")).expect("constructed regex");
        if attr_re.is_match(value) {
            return Some("inline event handler");
        }
    }
    let template_re =
        Regex::new(r"\{\{\s*(constructor|__proto__|prototype|eval|Function|require|import|process|global)")
            .expect("static regex");
    if template_re.is_match(value) {
        return Some("template injection pattern");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(content_security: bool) -> NormalizerConfig {
        NormalizerConfig { max_request_size: 10 * 1024 * 1024, enable_content_security_validation: content_security }
    }

    #[test]
    fn normalizes_minimal_request() {
        let body = json!({"model": "gpt-5-codex", "messages": [{"role": "user", "content": "Hi"}], "max_tokens": 16});
        let normalized = normalize(&body, DialectFormat::DialectA, &config(true)).unwrap();
        assert_eq!(normalized.model, "gpt-5-codex");
        assert_eq!(normalized.sampling.max_output_tokens, Some(16));
    }

    #[test]
    fn folds_legacy_prompt() {
        let body = json!({"model": "x", "prompt": "hello there"});
        let normalized = normalize(&body, DialectFormat::DialectA, &config(true)).unwrap();
        assert_eq!(normalized.messages.len(), 1);
        assert_eq!(normalized.messages[0].content.concat_text(), "hello there");
    }

    #[test]
    fn rejects_script_tag_when_screening_enabled() {
        let body = json!({"model": "x", "messages": [{"role": "user", "content": "<script>alert(1)</script>"}]});
        let err = normalize(&body, DialectFormat::DialectA, &config(true)).unwrap_err();
        assert!(matches!(err, NodeError::Invalid { .. }));
    }

    #[test]
    fn rejects_temperature_out_of_range() {
        let body = json!({"model": "x", "messages": [{"role": "user", "content": "hi"}], "temperature": 5.0});
        assert!(normalize(&body, DialectFormat::DialectA, &config(true)).is_err());
    }

    #[test]
    fn sanitization_preserves_originally_nonempty_text_that_would_become_empty() {
        let body = json!({"model": "x", "messages": [{"role": "user", "content": "<b></b>"}]});
        let normalized = normalize(&body, DialectFormat::DialectA, &config(false)).unwrap();
        assert_eq!(normalized.messages[0].content.concat_text(), "<b></b>");
    }

    #[test]
    fn concatenates_text_blocks_with_single_spaces() {
        let body = json!({
            "model": "x",
            "messages": [{"role": "user", "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]}]
        });
        let normalized = normalize(&body, DialectFormat::DialectA, &config(true)).unwrap();
        assert_eq!(normalized.messages[0].content.concat_text(), "a b");
    }
}
