//! Anthropic Messages API adapter.

mod error;
mod provider;
mod request;
mod response;
mod stream;
mod types;

pub use provider::AnthropicMessagesProvider;

pub(crate) const PROVIDER_NAME: &str = "anthropic_messages";

/// `max_tokens` sent when [`GenerationOptions::max_output_tokens`](crate::types::GenerationOptions::max_output_tokens)
/// is unset; the Messages API rejects requests without it.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
