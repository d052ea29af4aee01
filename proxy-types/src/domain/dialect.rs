use crate::domain::effort::ReasoningEffort;
use crate::domain::message::TokenUsage;
use crate::domain::tool::Tool;
use serde::{Deserialize, Serialize};

/// Which client-facing dialect a request arrived in (and therefore which
/// dialect the response must be translated back into).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum DialectFormat {
    /// Message-list, content-block dialect.
    DialectA,
    /// Flat chat-completions dialect.
    DialectO,
}

/// A single content block within a Dialect-A message. Only the `text`
/// variant is interpreted; other variants are preserved by callers that
/// need to round-trip unknown block types, but the normalizer only ever
/// emits `Text`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
}

/// The body of a message, either a flat string or an ordered sequence of
/// content blocks.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Concatenates the text of all `Text` blocks (or returns the flat
    /// string), joining block text with single spaces, per the request
    /// transformer's flattening rule.
    pub fn concat_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => text.as_str(),
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    pub fn is_block_array(&self) -> bool {
        matches!(self, MessageContent::Blocks(_))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NormalizedMessage {
    pub role: MessageRole,
    pub content: MessageContent,
}

/// Optional sampling/limits shared by both client dialects after normalization.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct SamplingParams {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// A fully validated, format-agnostic request ready for dialect-specific
/// translation into Dialect-R.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NormalizedRequest {
    pub format: DialectFormat,
    pub model: String,
    pub messages: Vec<NormalizedMessage>,
    pub system: Option<String>,
    pub sampling: SamplingParams,
    pub stream: bool,
    pub tools: Vec<Tool>,
}

impl NormalizedRequest {
    /// Concatenation of all user-role message text, used by the reasoning
    /// analyzer's content-length signal.
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.content.concat_text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// Which upstream provider a routed request targets.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Provider {
    Primary,
    Secondary,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Primary => "primary",
            Provider::Secondary => "secondary",
        }
    }
}

/// The outcome of resolving a client-supplied model alias against the
/// configured routing table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RoutingDecision {
    pub provider: Provider,
    pub requested_model: String,
    pub backend_model: String,
}

/// A Dialect-R request body sent to the upstream provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamRequest {
    pub model: String,
    pub input: UpstreamInput,
    pub reasoning_effort: ReasoningEffort,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tools: Vec<Tool>,
    pub stream: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpstreamInput {
    Text(String),
    Messages(Vec<UpstreamMessage>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamMessage {
    pub role: String,
    pub content: String,
}

/// One item within an `UpstreamResponse.output` sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Text { text: String },
    Reasoning {
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct UpstreamError {
    #[serde(default)]
    pub r#type: Option<String>,
    pub message: String,
}

/// A full (unary) Dialect-R response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamResponse {
    pub id: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub error: Option<UpstreamError>,
}

impl UpstreamResponse {
    /// Concatenation of every `Text` output item, in order.
    pub fn text(&self) -> String {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Text { text } => Some(text.as_str()),
                OutputItem::Reasoning { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A single chunk of a Dialect-R server-sent stream. Structurally identical
/// to `UpstreamResponse` but tagged `response.chunk`; the terminal chunk
/// carries a `Reasoning` item with `status = "completed"`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamStreamChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub error: Option<UpstreamError>,
}

impl UpstreamStreamChunk {
    pub fn is_terminal(&self) -> bool {
        self.output.iter().any(|item| {
            matches!(
                item,
                OutputItem::Reasoning { status: Some(s) } if s == "completed"
            )
        })
    }

    pub fn delta_text(&self) -> Option<String> {
        let text: String = self
            .output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Text { text } => Some(text.as_str()),
                OutputItem::Reasoning { .. } => None,
            })
            .collect();
        if text.is_empty() { None } else { Some(text) }
    }

    /// A chunk is well-formed iff it carries an id and the expected object tag
    /// (when present). Malformed chunks are dropped by the streaming state
    /// machine without being treated as terminal.
    pub fn is_well_formed(&self) -> bool {
        self.id.is_some() && self.object.as_deref().is_none_or(|o| o == "response.chunk")
    }
}
