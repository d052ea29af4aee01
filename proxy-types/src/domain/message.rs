use serde::{Deserialize, Serialize};

/// Token accounting for a single upstream call, including the optional
/// reasoning-token breakdown some providers attach to Dialect-R responses.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
}
