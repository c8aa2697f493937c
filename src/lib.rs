//! LLM 多后端统一调用库
//!
//! 通过 [`LLMProvider`] 以同一组操作访问 Anthropic Messages 与 Google Gemini：
//! 完整补全、基于 [`ResultStream`] 的流式输出、以及由模型选择并执行 [`Tool`] 的工具调用。
//! 所有调用都接收一个 [`Context`] 用于取消与截止时间控制。

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod provider;
mod sse;
pub mod stream;
pub mod tool;
pub mod types;

pub use client::{LLMClient, LLMClientBuilder};
pub use context::Context;
pub use error::LLMError;
pub use provider::{DynProvider, LLMProvider};
pub use stream::{ResultStream, StreamState};
pub use tool::{DynTool, ParamProperty, ParamType, ParamsSchema, Tool, ToolError};
pub use types::*;
