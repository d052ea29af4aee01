pub mod domain;
pub mod error;

pub mod prelude {
    pub use crate::domain::dialect::{
        ContentBlock, DialectFormat, MessageContent, MessageRole, NormalizedMessage,
        NormalizedRequest, OutputItem, Provider, RoutingDecision, SamplingParams, UpstreamError,
        UpstreamInput, UpstreamMessage, UpstreamRequest, UpstreamResponse, UpstreamStreamChunk,
    };
    pub use crate::domain::effort::{Complexity, ReasoningEffort};
    pub use crate::domain::message::TokenUsage;
    pub use crate::domain::tool::Tool;
    pub use crate::error::{ErrorKind, ProxyError, ProxyResult};
}
