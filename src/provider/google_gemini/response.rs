use crate::error::LLMError;
use crate::tool::dispatch::FunctionCall;
use crate::types::{ChatCompletion, FinishReason};

use super::types::{GeminiCandidate, GeminiGenerateContentResponse, GeminiUsageMetadata};

/// 将非流式响应映射为 ChatCompletion 文本取第一个候选的全部可见文本片段
pub(crate) fn map_completion(
    resp: &GeminiGenerateContentResponse,
    provider: &'static str,
) -> Result<ChatCompletion, LLMError> {
    let Some(candidate) = resp.candidates.first() else {
        let reason = resp
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
            .map(|reason| format!(" (prompt blocked: {reason})"))
            .unwrap_or_default();
        return Err(LLMError::provider(
            provider,
            format!("response contained no candidates{reason}"),
        ));
    };

    let (input_tokens, output_tokens) = convert_usage(resp.usage_metadata.as_ref());
    Ok(ChatCompletion {
        text: candidate_text(candidate),
        input_tokens,
        output_tokens,
        finish_reason: candidate.finish_reason.as_deref().map(convert_finish_reason),
    })
}

/// 流式 chunk 转为片段 既无文本也无用量和结束原因的 chunk 返回 None
pub(crate) fn map_stream_chunk(chunk: &GeminiGenerateContentResponse) -> Option<ChatCompletion> {
    let candidate = chunk.candidates.first();
    let text = candidate.map(candidate_text).unwrap_or_default();
    let finish_reason = candidate
        .and_then(|c| c.finish_reason.as_deref())
        .map(convert_finish_reason);
    if text.is_empty() && chunk.usage_metadata.is_none() && finish_reason.is_none() {
        return None;
    }
    let (input_tokens, output_tokens) = convert_usage(chunk.usage_metadata.as_ref());
    Some(ChatCompletion {
        text,
        input_tokens,
        output_tokens,
        finish_reason,
    })
}

/// 按候选、片段的顺序收集函数调用
pub(crate) fn function_calls(resp: &GeminiGenerateContentResponse) -> Vec<FunctionCall> {
    resp.candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref())
        .flat_map(|content| content.parts.iter())
        .filter_map(|part| part.function_call.as_ref())
        .map(|call| FunctionCall {
            name: call.name.clone(),
            args: call.args.clone(),
        })
        .collect()
}

fn candidate_text(candidate: &GeminiCandidate) -> String {
    candidate
        .content
        .as_ref()
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|part| part.visible_text())
                .collect::<String>()
        })
        .unwrap_or_default()
}

pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            FinishReason::ContentFilter
        }
        "MALFORMED_FUNCTION_CALL" => FinishReason::ToolCalls,
        other => FinishReason::Other(other.to_string()),
    }
}

/// 返回 (输入, 输出) token 数 缺失时为 0 输出包含思考 token
pub(crate) fn convert_usage(usage: Option<&GeminiUsageMetadata>) -> (u64, u64) {
    let Some(usage) = usage else {
        return (0, 0);
    };
    let output = usage
        .candidates_token_count
        .unwrap_or(0)
        .saturating_add(usage.thoughts_token_count.unwrap_or(0));
    (usage.prompt_token_count.unwrap_or(0), output)
}
