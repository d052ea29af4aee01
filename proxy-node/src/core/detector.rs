//! Classifies an inbound JSON body as Dialect-A or Dialect-O from shape
//! signals, before any normalization happens.

use proxy_types::domain::dialect::DialectFormat;
use serde_json::Value;

/// Inspects body shape and request path and returns the detected dialect.
/// Fails only when `body` is not a JSON object.
pub fn detect(body: &Value, path: &str) -> Result<DialectFormat, &'static str> {
    let obj = body.as_object().ok_or("request body must be a JSON object")?;

    if obj.contains_key("prompt") && !obj.contains_key("messages") {
        return Ok(DialectFormat::DialectA);
    }

    let has_dialect_o_signal = obj.contains_key("response_format")
        || obj.contains_key("max_completion_tokens")
        || is_function_tool_choice(obj.get("tool_choice"))
        || path.contains("chat/completions");

    let has_dialect_a_signal = messages_use_content_blocks(obj.get("messages"))
        || obj.get("system").is_some_and(|v| v.is_string())
        || (obj.contains_key("max_tokens") && !obj.contains_key("max_completion_tokens"))
        || path.contains("messages");

    if has_dialect_a_signal && !has_dialect_o_signal {
        return Ok(DialectFormat::DialectA);
    }
    if has_dialect_o_signal && !has_dialect_a_signal {
        return Ok(DialectFormat::DialectO);
    }
    if has_dialect_a_signal && has_dialect_o_signal {
        // Both present: content-block messages are the stronger signal.
        return Ok(if messages_use_content_blocks(obj.get("messages")) {
            DialectFormat::DialectA
        } else {
            DialectFormat::DialectO
        });
    }

    // Ambiguous: default to DialectA if messages[].content could be an array,
    // else DialectO.
    Ok(if messages_content_could_be_array(obj.get("messages")) {
        DialectFormat::DialectA
    } else {
        DialectFormat::DialectO
    })
}

fn is_function_tool_choice(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Object(obj)) => obj.get("type").and_then(Value::as_str) == Some("function"),
        _ => false,
    }
}

fn messages_use_content_blocks(messages: Option<&Value>) -> bool {
    let Some(Value::Array(messages)) = messages else { return false };
    messages.iter().any(|m| {
        m.get("content")
            .is_some_and(|c| c.is_array() && c.as_array().unwrap().iter().any(|b| b.get("type").and_then(Value::as_str) == Some("text")))
    })
}

fn messages_content_could_be_array(messages: Option<&Value>) -> bool {
    let Some(Value::Array(messages)) = messages else { return false };
    messages.iter().any(|m| m.get("content").is_some_and(Value::is_array))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_dialect_a_from_content_blocks() {
        let body = json!({"model": "x", "messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}]});
        assert_eq!(detect(&body, "/v1/messages").unwrap(), DialectFormat::DialectA);
    }

    #[test]
    fn detects_dialect_o_from_response_format() {
        let body = json!({"model": "x", "messages": [{"role": "user", "content": "hi"}], "response_format": {"type": "json_object"}});
        assert_eq!(detect(&body, "/v1/chat/completions").unwrap(), DialectFormat::DialectO);
    }

    #[test]
    fn folds_legacy_prompt_into_dialect_a() {
        let body = json!({"model": "x", "prompt": "hello"});
        assert_eq!(detect(&body, "/v1/completions").unwrap(), DialectFormat::DialectA);
    }

    #[test]
    fn ambiguous_flat_string_with_max_tokens_defaults_dialect_o() {
        let body = json!({"model": "x", "messages": [{"role": "user", "content": "hi"}], "max_tokens": 16});
        // max_tokens-only is a Dialect-A signal, so this resolves to DialectA.
        assert_eq!(detect(&body, "/").unwrap(), DialectFormat::DialectA);
    }

    #[test]
    fn rejects_non_object_body() {
        let body = json!([1, 2, 3]);
        assert!(detect(&body, "/").is_err());
    }
}
