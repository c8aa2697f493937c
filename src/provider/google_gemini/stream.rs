use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;

use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::sse::SseDecoder;
use crate::stream::FragmentSource;
use crate::types::ChatCompletion;

use super::PROVIDER_NAME;
use super::error::parse_gemini_error;
use super::response::map_stream_chunk;
use super::types::GeminiGenerateContentResponse;

/// `streamGenerateContent?alt=sse` 的片段源 每个 `data:` 负载是一个完整的 GenerateContentResponse
///
/// Gemini 没有显式的结束事件 响应体结束即视为完成。
pub(crate) struct GeminiFragmentSource {
    events: SseDecoder,
}

impl GeminiFragmentSource {
    pub(crate) fn new(body: HttpBodyStream) -> Self {
        Self {
            events: SseDecoder::new(body, PROVIDER_NAME),
        }
    }
}

#[async_trait]
impl FragmentSource for GeminiFragmentSource {
    async fn next_fragment(&mut self) -> Result<Option<ChatCompletion>, LLMError> {
        while let Some(event) = self.events.next().await {
            let event = event?;
            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                return Ok(None);
            }

            let value: Value = serde_json::from_str(data).map_err(|err| {
                LLMError::provider(PROVIDER_NAME, format!("failed to parse stream chunk: {err}"))
            })?;
            if value.get("error").is_some() {
                return Err(parse_gemini_error(200, data, None));
            }

            let chunk: GeminiGenerateContentResponse =
                serde_json::from_value(value).map_err(|err| {
                    LLMError::provider(PROVIDER_NAME, format!("unexpected stream chunk: {err}"))
                })?;
            if let Some(fragment) = map_stream_chunk(&chunk) {
                return Ok(Some(fragment));
            }
        }
        Ok(None)
    }
}
