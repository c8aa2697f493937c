use crate::tool::dispatch::FunctionCall;
use crate::types::{ChatCompletion, FinishReason};

use super::types::{AnthropicMessageResponse, AnthropicUsage};

/// Joins every text block in order; non-text blocks are ignored.
pub(crate) fn map_completion(resp: &AnthropicMessageResponse) -> ChatCompletion {
    let text = resp
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text.as_deref())
        .collect::<String>();
    let (input_tokens, output_tokens) = convert_usage(resp.usage.as_ref());
    ChatCompletion {
        text,
        input_tokens,
        output_tokens,
        finish_reason: resp.stop_reason.as_deref().map(convert_finish_reason),
    }
}

/// `tool_use` blocks in response order.
pub(crate) fn function_calls(resp: &AnthropicMessageResponse) -> Vec<FunctionCall> {
    resp.content
        .iter()
        .filter(|block| block.kind == "tool_use")
        .filter_map(|block| {
            let name = block.name.clone()?;
            Some(FunctionCall {
                name,
                args: block.input.clone().unwrap_or_default(),
            })
        })
        .collect()
}

pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" | "pause_turn" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

/// Returns (input, output); missing counters are 0.
pub(crate) fn convert_usage(usage: Option<&AnthropicUsage>) -> (u64, u64) {
    usage
        .map(|usage| {
            (
                usage.input_tokens.unwrap_or(0),
                usage.output_tokens.unwrap_or(0),
            )
        })
        .unwrap_or((0, 0))
}
