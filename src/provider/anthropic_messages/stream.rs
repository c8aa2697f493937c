use async_trait::async_trait;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::sse::SseDecoder;
use crate::stream::FragmentSource;
use crate::types::ChatCompletion;

use super::PROVIDER_NAME;
use super::error::parse_anthropic_error;
use super::response::convert_finish_reason;
use super::types::{
    AnthropicContentBlockDelta, AnthropicMessageDelta, AnthropicMessageStart, AnthropicUsage,
};

/// Fragment source for Messages SSE.
///
/// Prompt usage arrives once in `message_start`; output usage grows through
/// `message_delta`. Both are carried on every fragment emitted afterwards.
pub(crate) struct AnthropicFragmentSource {
    events: SseDecoder,
    input_tokens: u64,
    output_tokens: u64,
}

impl AnthropicFragmentSource {
    pub(crate) fn new(body: HttpBodyStream) -> Self {
        Self {
            events: SseDecoder::new(body, PROVIDER_NAME),
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    fn record_usage(&mut self, usage: Option<&AnthropicUsage>) {
        let Some(usage) = usage else {
            return;
        };
        if let Some(input) = usage.input_tokens {
            self.input_tokens = input;
        }
        if let Some(output) = usage.output_tokens {
            self.output_tokens = output;
        }
    }

    fn fragment(&self, text: String) -> ChatCompletion {
        ChatCompletion {
            text,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            finish_reason: None,
        }
    }
}

fn decode<T: DeserializeOwned>(event_type: &str, value: Value) -> Result<T, LLMError> {
    serde_json::from_value(value).map_err(|err| {
        LLMError::provider(
            PROVIDER_NAME,
            format!("unexpected {event_type} event: {err}"),
        )
    })
}

#[async_trait]
impl FragmentSource for AnthropicFragmentSource {
    async fn next_fragment(&mut self) -> Result<Option<ChatCompletion>, LLMError> {
        while let Some(event) = self.events.next().await {
            let event = event?;
            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }

            let value: Value = serde_json::from_str(data).map_err(|err| {
                LLMError::provider(PROVIDER_NAME, format!("failed to parse stream event: {err}"))
            })?;
            // The `type` field mirrors the SSE event name; prefer it when present.
            let event_type = value
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or(event.event)
                .unwrap_or_default();

            match event_type.as_str() {
                "message_start" => {
                    let start: AnthropicMessageStart = decode(&event_type, value)?;
                    self.record_usage(start.message.usage.as_ref());
                }
                "content_block_delta" => {
                    let delta: AnthropicContentBlockDelta = decode(&event_type, value)?;
                    if delta.delta.kind.as_deref().is_some_and(|kind| kind != "text_delta") {
                        continue;
                    }
                    match delta.delta.text {
                        Some(text) if !text.is_empty() => {
                            return Ok(Some(self.fragment(text)));
                        }
                        _ => {}
                    }
                }
                "message_delta" => {
                    let delta: AnthropicMessageDelta = decode(&event_type, value)?;
                    self.record_usage(delta.delta.usage.as_ref());
                    self.record_usage(delta.usage.as_ref());
                    let mut fragment = self.fragment(String::new());
                    fragment.finish_reason =
                        delta.delta.stop_reason.as_deref().map(convert_finish_reason);
                    return Ok(Some(fragment));
                }
                "message_stop" => return Ok(None),
                "error" => return Err(parse_anthropic_error(200, data, None)),
                _ => {}
            }
        }

        Err(LLMError::StreamClosed {
            message: "stream ended before message_stop".to_string(),
        })
    }
}
