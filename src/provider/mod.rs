use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::Context;
use crate::error::LLMError;
use crate::stream::ResultStream;
use crate::tool::DynTool;
use crate::types::{CapabilityDescriptor, ChatCompletion, ChatMessage};

pub mod anthropic_messages;
pub mod google_gemini;
pub(crate) mod retry;

/// 统一的 Provider Trait 每个后端适配器实现该接口即可接入
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// 发送完整对话并等待完整响应
    async fn completion(
        &self,
        ctx: &Context,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatCompletion, LLMError>;

    /// 以流式方式返回增量结果 错误以 `StreamResult::Error` 形式投递
    ///
    /// 必须在 Tokio 运行时内调用
    fn stream(&self, ctx: &Context, model: &str, messages: &[ChatMessage]) -> ResultStream;

    /// 附带工具声明发送对话 并执行模型请求的第一个工具
    async fn run_tools(
        &self,
        ctx: &Context,
        model: &str,
        messages: &[ChatMessage],
        tools: &[DynTool],
    ) -> Result<Value, LLMError>;

    /// 描述支持的能力范围
    fn capabilities(&self) -> CapabilityDescriptor;

    /// 供应商名称
    fn name(&self) -> &'static str;
}

/// 线程安全 Provider
pub type DynProvider = Arc<dyn LLMProvider>;
