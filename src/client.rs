use std::collections::HashMap;

use serde_json::Value;

use crate::context::Context;
use crate::error::LLMError;
use crate::provider::DynProvider;
use crate::stream::ResultStream;
use crate::tool::DynTool;
use crate::types::{CapabilityDescriptor, ChatCompletion, ChatMessage};

/// LLM 调用入口 按句柄路由到已注册的 Provider
pub struct LLMClient {
    providers: HashMap<String, DynProvider>,
}

impl LLMClient {
    /// 创建 Builder 便于后续注册 Provider
    pub fn builder() -> LLMClientBuilder {
        LLMClientBuilder {
            providers: HashMap::new(),
        }
    }

    /// 发送完整对话并等待完整响应
    pub async fn completion(
        &self,
        handle: &str,
        ctx: &Context,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatCompletion, LLMError> {
        let provider = self.get_provider(handle)?;
        provider.completion(ctx, model, messages).await
    }

    /// 发起流式请求 句柄未知时立即返回错误 其余错误通过流投递
    pub fn stream(
        &self,
        handle: &str,
        ctx: &Context,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ResultStream, LLMError> {
        let provider = self.get_provider(handle)?;
        Ok(provider.stream(ctx, model, messages))
    }

    /// 附带工具发送对话并执行模型选择的工具
    pub async fn run_tools(
        &self,
        handle: &str,
        ctx: &Context,
        model: &str,
        messages: &[ChatMessage],
        tools: &[DynTool],
    ) -> Result<Value, LLMError> {
        let provider = self.get_provider(handle)?;
        provider.run_tools(ctx, model, messages, tools).await
    }

    /// 返回当前已注册的句柄
    pub fn handles(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// 查询指定句柄的能力描述
    pub fn capabilities(&self, handle: &str) -> Result<CapabilityDescriptor, LLMError> {
        let provider = self.get_provider(handle)?;
        Ok(provider.capabilities())
    }

    /// 返回所有支持工具调用的句柄列表
    pub fn handles_supporting_tools(&self) -> Vec<String> {
        self.handles_where(|caps| caps.supports_tools)
    }

    /// 返回所有支持流式输出的句柄列表
    pub fn handles_supporting_stream(&self) -> Vec<String> {
        self.handles_where(|caps| caps.supports_stream)
    }

    fn handles_where(&self, predicate: impl Fn(&CapabilityDescriptor) -> bool) -> Vec<String> {
        self.providers
            .iter()
            .filter(|(_, provider)| predicate(&provider.capabilities()))
            .map(|(handle, _)| handle.clone())
            .collect()
    }

    fn get_provider(&self, handle: &str) -> Result<&DynProvider, LLMError> {
        self.providers
            .get(handle)
            .ok_or_else(|| LLMError::Validation {
                message: format!("unknown model handle: {handle}"),
            })
    }
}

/// 负责注册 Provider 的 Builder
pub struct LLMClientBuilder {
    providers: HashMap<String, DynProvider>,
}

impl LLMClientBuilder {
    /// 注册一个句柄对应的 Provider 同名句柄会被覆盖
    pub fn register_handle<S: Into<String>>(mut self, handle: S, provider: DynProvider) -> Self {
        self.providers.insert(handle.into(), provider);
        self
    }

    /// 构建最终的 LLMClient
    pub fn build(self) -> LLMClient {
        LLMClient {
            providers: self.providers,
        }
    }
}
