use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::{Credential, ModelConfig};
use crate::context::Context;
use crate::error::LLMError;
use crate::http::{
    DynHttpTransport, HttpResponse, HttpStreamResponse, collect_body_text,
    post_json_stream_with_headers, post_json_with_headers,
};
use crate::provider::LLMProvider;
use crate::provider::retry::retry_after_from_headers;
use crate::stream::{ResultStream, spawn_stream};
use crate::tool::DynTool;
use crate::tool::dispatch::{describe_tools, dispatch};
use crate::types::{CapabilityDescriptor, ChatCompletion, ChatMessage, GenerationOptions};

use super::PROVIDER_NAME;
use super::error::parse_anthropic_error;
use super::request::build_anthropic_body;
use super::response::{function_calls, map_completion};
use super::stream::AnthropicFragmentSource;
use super::types::AnthropicMessageResponse;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_VERSION: &str = "2023-06-01";
const DEFAULT_API_KEY_HEADER: &str = "x-api-key";

/// Anthropic Messages API 适配器
#[derive(Clone)]
pub struct AnthropicMessagesProvider {
    transport: DynHttpTransport,
    base_url: String,
    api_key: String,
    api_key_header: String,
    version: String,
    beta: Option<String>,
    options: GenerationOptions,
}

impl AnthropicMessagesProvider {
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            version: DEFAULT_VERSION.to_string(),
            beta: None,
            options: GenerationOptions::default(),
        }
    }

    /// 自定义 base_url 便于接入代理或兼容网关
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 覆盖携带 API Key 的请求头名称 默认 `x-api-key`
    pub fn with_api_key_header(mut self, header: impl Into<String>) -> Self {
        self.api_key_header = header.into();
        self
    }

    /// 覆盖 `anthropic-version` 请求头
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// 设置 `anthropic-beta` 请求头
    pub fn with_beta(mut self, beta: impl Into<String>) -> Self {
        self.beta = Some(beta.into());
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// 从 [`ModelConfig`] 构建
    ///
    /// `extra` 中的 `version` 与 `beta` 分别映射到对应请求头；
    /// 第一方 API 不区分区域 `region` 与 `project` 会被忽略。
    ///
    /// # Errors
    ///
    /// 凭证不是 API Key 时返回 [`LLMError::Auth`]。
    pub fn from_model_config(
        config: &ModelConfig,
        transport: DynHttpTransport,
    ) -> Result<Self, LLMError> {
        let (api_key, api_key_header) = match &config.credential {
            Credential::ApiKey { header, key } => (key.clone(), header.as_deref()),
            Credential::None => {
                return Err(LLMError::Auth {
                    message: format!("provider {PROVIDER_NAME} requires credential"),
                });
            }
            _ => {
                return Err(LLMError::Auth {
                    message: format!("provider {PROVIDER_NAME} only supports API key credentials"),
                });
            }
        };

        let mut provider = Self::new(transport, api_key).with_options(config.options.clone());
        if let Some(base_url) = config.base_url.as_deref().filter(|url| !url.trim().is_empty()) {
            provider = provider.with_base_url(base_url);
        }
        if let Some(header) = api_key_header.map(str::trim).filter(|name| !name.is_empty()) {
            provider = provider.with_api_key_header(header);
        }
        if let Some(version) = config.extra.get("version").and_then(Value::as_str) {
            provider = provider.with_version(version);
        }
        if let Some(beta) = config.extra.get("beta").and_then(Value::as_str) {
            provider = provider.with_beta(beta);
        }
        if config.region.is_some() {
            debug!(provider = PROVIDER_NAME, "region is ignored by the first-party API");
        }
        Ok(provider)
    }

    pub(crate) fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/messages")
        } else {
            format!("{base}/v1/messages")
        }
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(self.api_key_header.clone(), self.api_key.clone());
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers.insert("anthropic-version".to_string(), self.version.clone());
        if let Some(beta) = &self.beta {
            headers.insert("anthropic-beta".to_string(), beta.clone());
        }
        headers
    }

    async fn send_message(
        &self,
        ctx: &Context,
        body: &Value,
    ) -> Result<AnthropicMessageResponse, LLMError> {
        let response = ctx
            .run(post_json_with_headers(
                self.transport.as_ref(),
                self.endpoint(),
                self.build_headers(),
                body,
            ))
            .await??;
        let text = self.ensure_success(response)?;
        self.try_parse(&text)
    }

    async fn open_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<AnthropicFragmentSource, LLMError> {
        let body = build_anthropic_body(model, messages, None, &self.options, true)?;
        let HttpStreamResponse {
            status,
            headers,
            body,
        } = post_json_stream_with_headers(
            self.transport.as_ref(),
            self.endpoint(),
            self.build_headers(),
            &body,
        )
        .await?;
        if !(200..300).contains(&status) {
            let text = collect_body_text(body, PROVIDER_NAME).await?;
            return Err(parse_anthropic_error(
                status,
                &text,
                retry_after_from_headers(&headers),
            ));
        }
        Ok(AnthropicFragmentSource::new(body))
    }

    fn ensure_success(&self, response: HttpResponse) -> Result<String, LLMError> {
        let HttpResponse {
            status,
            headers,
            body,
        } = response;
        let text = String::from_utf8(body).map_err(|err| LLMError::transport(err.to_string()))?;
        if (200..300).contains(&status) {
            Ok(text)
        } else {
            Err(parse_anthropic_error(
                status,
                &text,
                retry_after_from_headers(&headers),
            ))
        }
    }

    fn try_parse<T: DeserializeOwned>(&self, text: &str) -> Result<T, LLMError> {
        serde_json::from_str(text).map_err(|err| {
            LLMError::provider(
                PROVIDER_NAME,
                format!("failed to parse Anthropic response: {err}"),
            )
        })
    }
}

#[async_trait]
impl LLMProvider for AnthropicMessagesProvider {
    async fn completion(
        &self,
        ctx: &Context,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatCompletion, LLMError> {
        let body = build_anthropic_body(model, messages, None, &self.options, false)?;
        let parsed = self.send_message(ctx, &body).await?;
        Ok(map_completion(&parsed))
    }

    fn stream(&self, ctx: &Context, model: &str, messages: &[ChatMessage]) -> ResultStream {
        let this = self.clone();
        let model = model.to_string();
        let messages = messages.to_vec();
        spawn_stream(ctx, PROVIDER_NAME, async move {
            this.open_stream(&model, &messages).await
        })
    }

    async fn run_tools(
        &self,
        ctx: &Context,
        model: &str,
        messages: &[ChatMessage],
        tools: &[DynTool],
    ) -> Result<Value, LLMError> {
        let descriptors = describe_tools(tools)?;
        let body = build_anthropic_body(
            model,
            messages,
            Some(descriptors.as_slice()),
            &self.options,
            false,
        )?;
        let parsed = self.send_message(ctx, &body).await?;
        let calls = function_calls(&parsed);
        debug!(
            provider = PROVIDER_NAME,
            requested = calls.len(),
            "tool_use blocks in response"
        );
        dispatch(ctx, PROVIDER_NAME, calls, tools).await
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            supports_stream: true,
            supports_tools: true,
            reports_completion_usage: true,
            reports_stream_usage: true,
        }
    }

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::ProviderKind;
    use crate::http::reqwest::default_dyn_transport;

    fn config(credential: Credential) -> ModelConfig {
        ModelConfig {
            handle: "claude".to_string(),
            provider: ProviderKind::AnthropicMessages,
            credential,
            region: Some("us-east5".to_string()),
            project: None,
            base_url: None,
            options: GenerationOptions::default(),
            extra: HashMap::new(),
        }
    }

    #[test]
    fn endpoint_appends_messages_path() {
        let transport = default_dyn_transport().expect("transport");
        let provider = AnthropicMessagesProvider::new(transport.clone(), "k");
        assert_eq!(provider.endpoint(), "https://api.anthropic.com/v1/messages");

        let proxied = AnthropicMessagesProvider::new(transport, "k")
            .with_base_url("https://gateway.example.com/anthropic/v1/");
        assert_eq!(
            proxied.endpoint(),
            "https://gateway.example.com/anthropic/v1/messages"
        );
    }

    #[test]
    fn from_model_config_reads_headers_from_extra() {
        let mut cfg = config(Credential::ApiKey {
            header: None,
            key: "sk-ant".to_string(),
        });
        cfg.extra.insert("beta".to_string(), json!("tools-2024-05-16"));
        cfg.extra.insert("version".to_string(), json!("2024-01-01"));

        let provider = AnthropicMessagesProvider::from_model_config(
            &cfg,
            default_dyn_transport().expect("transport"),
        )
        .expect("provider");
        let headers = provider.build_headers();
        assert_eq!(headers.get("x-api-key").map(String::as_str), Some("sk-ant"));
        assert_eq!(
            headers.get("anthropic-version").map(String::as_str),
            Some("2024-01-01")
        );
        assert_eq!(
            headers.get("anthropic-beta").map(String::as_str),
            Some("tools-2024-05-16")
        );
    }

    #[test]
    fn from_model_config_honours_api_key_header() {
        let cfg = config(Credential::ApiKey {
            header: Some("Authorization-Key".to_string()),
            key: "sk-ant".to_string(),
        });
        let provider = AnthropicMessagesProvider::from_model_config(
            &cfg,
            default_dyn_transport().expect("transport"),
        )
        .expect("provider");
        let headers = provider.build_headers();
        assert_eq!(
            headers.get("Authorization-Key").map(String::as_str),
            Some("sk-ant")
        );
        assert!(!headers.contains_key("x-api-key"));
    }

    #[test]
    fn from_model_config_requires_api_key() {
        let transport = default_dyn_transport().expect("transport");
        for credential in [
            Credential::None,
            Credential::Bearer {
                token: "t".to_string(),
            },
        ] {
            let err = AnthropicMessagesProvider::from_model_config(&config(credential), transport.clone())
                .err()
                .expect("auth error");
            assert!(matches!(err, LLMError::Auth { .. }));
        }
    }
}
