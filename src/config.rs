use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::LLMClient;
use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::provider::DynProvider;
use crate::provider::anthropic_messages::AnthropicMessagesProvider;
use crate::provider::google_gemini::GoogleGeminiProvider;
use crate::types::GenerationOptions;

/// 模型配置 描述一个可调用后端
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// 自定义句柄 例如 `default-gemini`
    pub handle: String,
    pub provider: ProviderKind,
    pub credential: Credential,
    /// 区域 Vertex AI 必填 例如 `us-central1` 或 `global`
    #[serde(default)]
    pub region: Option<String>,
    /// GCP 项目 ID 设置后 Gemini 走 Vertex AI
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub options: GenerationOptions,
    /// 附加设置 例如 Anthropic 的 version / beta
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

/// 供应商类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    AnthropicMessages,
    GoogleGemini,
}

/// 鉴权信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    /// 简单 API Key
    ApiKey {
        /// header 名称 留空时按 provider 默认
        #[serde(default)]
        header: Option<String>,
        /// 密钥
        key: String,
    },
    /// Bearer Token 例如 `gcloud auth print-access-token` 的输出
    Bearer { token: String },
    /// Google/GCP Service Account JSON
    ServiceAccount { json: Value },
    /// 无需鉴权的本地 provider
    None,
}

/// 根据一组模型配置构建 LLMClient 任一配置失败即返回错误
pub fn build_client_from_configs(
    configs: &[ModelConfig],
    transport: DynHttpTransport,
) -> Result<LLMClient, LLMError> {
    let mut builder = LLMClient::builder();

    for config in configs {
        let provider = build_provider_from_config(config, transport.clone())?;
        builder = builder.register_handle(config.handle.clone(), provider);
    }

    Ok(builder.build())
}

/// 按 [`ProviderKind`] 构建单个 Provider
pub fn build_provider_from_config(
    config: &ModelConfig,
    transport: DynHttpTransport,
) -> Result<DynProvider, LLMError> {
    let provider: DynProvider = match config.provider {
        ProviderKind::AnthropicMessages => {
            Arc::new(AnthropicMessagesProvider::from_model_config(config, transport)?)
        }
        ProviderKind::GoogleGemini => {
            Arc::new(GoogleGeminiProvider::from_model_config(config, transport)?)
        }
    };
    Ok(provider)
}
