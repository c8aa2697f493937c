use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Non-streaming response payload returned by Anthropic Messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AnthropicMessageResponse {
    /// Ordered list of content blocks.
    #[serde(default)]
    pub(crate) content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    pub(crate) stop_reason: Option<String>,
    #[serde(default)]
    pub(crate) usage: Option<AnthropicUsage>,
}

/// Single content block; only `text` and `tool_use` are read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AnthropicContentBlock {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) text: Option<String>,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) input: Option<Value>,
}

/// Usage counters returned by Anthropic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct AnthropicUsage {
    #[serde(default)]
    pub(crate) input_tokens: Option<u64>,
    #[serde(default)]
    pub(crate) output_tokens: Option<u64>,
}

/// `message_start` carries the initial message envelope with prompt usage.
#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicMessageStart {
    pub(crate) message: AnthropicStartMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicStartMessage {
    #[serde(default)]
    pub(crate) usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicContentBlockDelta {
    pub(crate) delta: AnthropicDelta,
}

/// `text_delta`, `input_json_delta`, `thinking_delta` and friends.
#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicDelta {
    #[serde(rename = "type", default)]
    pub(crate) kind: Option<String>,
    #[serde(default)]
    pub(crate) text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicMessageDelta {
    #[serde(default)]
    pub(crate) delta: AnthropicMessageDeltaBody,
    #[serde(default)]
    pub(crate) usage: Option<AnthropicUsage>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AnthropicMessageDeltaBody {
    #[serde(default)]
    pub(crate) stop_reason: Option<String>,
    /// Some gateways nest usage inside the delta.
    #[serde(default)]
    pub(crate) usage: Option<AnthropicUsage>,
}
