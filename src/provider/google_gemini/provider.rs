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
use super::error::parse_gemini_error;
use super::request::build_gemini_body;
use super::response::{function_calls, map_completion};
use super::stream::GeminiFragmentSource;
use super::types::GeminiGenerateContentResponse;

const DEVELOPER_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini 服务入口
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeminiTarget {
    /// Gemini Developer API（generativelanguage.googleapis.com）
    Developer { base_url: String },
    /// Vertex AI 发布者模型 `projects/{project}/locations/{location}/publishers/google/models/*`
    Vertex {
        base_url: String,
        project: String,
        location: String,
    },
}

impl GeminiTarget {
    /// 根据区域推导 Vertex 默认域名 `global` 使用无区域前缀的主机
    pub fn vertex(project: impl Into<String>, location: impl Into<String>) -> Self {
        let location = location.into();
        let base_url = if location == "global" {
            "https://aiplatform.googleapis.com".to_string()
        } else {
            format!("https://{location}-aiplatform.googleapis.com")
        };
        Self::Vertex {
            base_url,
            project: project.into(),
            location,
        }
    }

    fn set_base_url(&mut self, url: String) {
        match self {
            Self::Developer { base_url } | Self::Vertex { base_url, .. } => *base_url = url,
        }
    }
}

#[derive(Clone)]
enum GeminiAuth {
    ApiKey(String),
    Bearer(String),
}

/// Google Gemini GenerateContent 适配器
#[derive(Clone)]
pub struct GoogleGeminiProvider {
    transport: DynHttpTransport,
    target: GeminiTarget,
    auth: GeminiAuth,
    api_key_header: String,
    options: GenerationOptions,
}

impl GoogleGeminiProvider {
    /// 使用 API Key 访问 Gemini Developer API
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            target: GeminiTarget::Developer {
                base_url: DEVELOPER_BASE_URL.to_string(),
            },
            auth: GeminiAuth::ApiKey(api_key.into()),
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            options: GenerationOptions::default(),
        }
    }

    /// 使用 OAuth access token 访问 Vertex AI
    pub fn vertex(
        transport: DynHttpTransport,
        project: impl Into<String>,
        location: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            target: GeminiTarget::vertex(project, location),
            auth: GeminiAuth::Bearer(access_token.into()),
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            options: GenerationOptions::default(),
        }
    }

    /// 自定义 base_url 便于接入代理或私有端点
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.target.set_base_url(base_url.into());
        self
    }

    /// 改用 `Authorization: Bearer` 鉴权
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.auth = GeminiAuth::Bearer(token.into());
        self
    }

    /// 覆盖携带 API Key 的请求头名称 默认 `x-goog-api-key`
    pub fn with_api_key_header(mut self, header: impl Into<String>) -> Self {
        self.api_key_header = header.into();
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn target(&self) -> &GeminiTarget {
        &self.target
    }

    /// 从 [`ModelConfig`] 构建
    ///
    /// 配置了 `project` 时使用 Vertex AI 此时必须同时提供 `region`；
    /// 只配置 `region` 而缺少 `project` 视为配置错误。
    ///
    /// # Errors
    ///
    /// 凭证缺失或为 service account 时返回 [`LLMError::Auth`]，
    /// Vertex 参数不完整时返回 [`LLMError::InvalidConfig`]。
    pub fn from_model_config(
        config: &ModelConfig,
        transport: DynHttpTransport,
    ) -> Result<Self, LLMError> {
        let mut api_key_header = None;
        let auth = match &config.credential {
            Credential::ApiKey { header, key } => {
                api_key_header = non_empty(header);
                GeminiAuth::ApiKey(key.clone())
            }
            Credential::Bearer { token } => GeminiAuth::Bearer(token.clone()),
            Credential::ServiceAccount { .. } => {
                return Err(LLMError::Auth {
                    message: format!(
                        "provider {PROVIDER_NAME} expects a minted access token, not a service account"
                    ),
                });
            }
            Credential::None => {
                return Err(LLMError::Auth {
                    message: format!("provider {PROVIDER_NAME} requires credential"),
                });
            }
        };

        let target = match (non_empty(&config.project), non_empty(&config.region)) {
            (Some(project), Some(region)) => GeminiTarget::vertex(project, region),
            (Some(_), None) => {
                return Err(LLMError::InvalidConfig {
                    field: "region".to_string(),
                    reason: "Vertex AI requires a region when project is set".to_string(),
                });
            }
            (None, Some(_)) => {
                return Err(LLMError::InvalidConfig {
                    field: "project".to_string(),
                    reason: "Vertex AI requires a project when region is set".to_string(),
                });
            }
            (None, None) => GeminiTarget::Developer {
                base_url: DEVELOPER_BASE_URL.to_string(),
            },
        };

        let mut provider = Self {
            transport,
            target,
            auth,
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            options: config.options.clone(),
        };
        if let Some(base_url) = non_empty(&config.base_url) {
            provider = provider.with_base_url(base_url);
        }
        if let Some(header) = api_key_header {
            provider = provider.with_api_key_header(header);
        }
        Ok(provider)
    }

    /// 构建 GenerateContent 端点 `stream` 为 true 时使用 SSE 流式端点
    pub(crate) fn endpoint(&self, model: &str, stream: bool) -> String {
        let method = if stream {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        match &self.target {
            GeminiTarget::Developer { base_url } => {
                let base = base_url.trim_end_matches('/');
                let model = if model.starts_with("models/") || model.starts_with("tunedModels/") {
                    model.to_string()
                } else {
                    format!("models/{model}")
                };
                if base.ends_with("/v1beta") || base.ends_with("/v1") {
                    format!("{base}/{model}:{method}")
                } else {
                    format!("{base}/v1beta/{model}:{method}")
                }
            }
            GeminiTarget::Vertex {
                base_url,
                project,
                location,
            } => {
                let base = base_url.trim_end_matches('/');
                let model = model.trim_start_matches("models/");
                let resource = if model.starts_with("publishers/") {
                    model.to_string()
                } else {
                    format!("publishers/google/models/{model}")
                };
                format!("{base}/v1/projects/{project}/locations/{location}/{resource}:{method}")
            }
        }
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        match &self.auth {
            GeminiAuth::ApiKey(key) => {
                headers.insert(self.api_key_header.clone(), key.clone());
            }
            GeminiAuth::Bearer(token) => {
                headers.insert("Authorization".to_string(), format!("Bearer {token}"));
            }
        }
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers
    }

    async fn generate(
        &self,
        ctx: &Context,
        model: &str,
        body: &Value,
    ) -> Result<GeminiGenerateContentResponse, LLMError> {
        let url = self.endpoint(model, false);
        let response = ctx
            .run(post_json_with_headers(
                self.transport.as_ref(),
                url,
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
    ) -> Result<GeminiFragmentSource, LLMError> {
        let body = build_gemini_body(messages, None, &self.options)?;
        let url = self.endpoint(model, true);
        let HttpStreamResponse {
            status,
            headers,
            body,
        } = post_json_stream_with_headers(self.transport.as_ref(), url, self.build_headers(), &body)
            .await?;
        if !(200..300).contains(&status) {
            let text = collect_body_text(body, PROVIDER_NAME).await?;
            return Err(parse_gemini_error(
                status,
                &text,
                retry_after_from_headers(&headers),
            ));
        }
        Ok(GeminiFragmentSource::new(body))
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
            Err(parse_gemini_error(
                status,
                &text,
                retry_after_from_headers(&headers),
            ))
        }
    }

    fn try_parse<T: DeserializeOwned>(&self, text: &str) -> Result<T, LLMError> {
        serde_json::from_str(text).map_err(|err| {
            LLMError::provider(PROVIDER_NAME, format!("failed to parse Gemini response: {err}"))
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl LLMProvider for GoogleGeminiProvider {
    async fn completion(
        &self,
        ctx: &Context,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatCompletion, LLMError> {
        let body = build_gemini_body(messages, None, &self.options)?;
        let parsed = self.generate(ctx, model, &body).await?;
        map_completion(&parsed, PROVIDER_NAME)
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
        let body = build_gemini_body(messages, Some(descriptors.as_slice()), &self.options)?;
        let parsed = self.generate(ctx, model, &body).await?;
        let calls = function_calls(&parsed);
        debug!(
            provider = PROVIDER_NAME,
            requested = calls.len(),
            "function calls in response"
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
