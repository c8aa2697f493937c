//! Shared data structures for chat requests, completions and streamed results.
//!
//! Adapters translate these into their vendor wire formats, so nothing here knows
//! about a particular backend.

use serde::{Deserialize, Serialize};

use crate::error::LLMError;

/// Chat role string. Backends map the well-known roles onto their own vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    pub fn system() -> Self {
        Self("system".to_string())
    }

    pub fn user() -> Self {
        Self("user".to_string())
    }

    pub fn assistant() -> Self {
        Self("assistant".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Matches `system` case-insensitively.
    pub fn is_system(&self) -> bool {
        self.0.eq_ignore_ascii_case("system")
    }

    /// Matches `assistant` (and Gemini's `model`) case-insensitively.
    pub fn is_assistant(&self) -> bool {
        self.0.eq_ignore_ascii_case("assistant") || self.0.eq_ignore_ascii_case("model")
    }
}

/// One turn of a conversation.
///
/// # Examples
///
/// ```
/// use relay_llm::types::{ChatMessage, Role};
///
/// let messages = vec![
///     ChatMessage::system("You are concise."),
///     ChatMessage::user("Summarize Rust traits."),
/// ];
/// assert_eq!(messages[1].role, Role::user());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::system(), content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::user(), content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::assistant(), content)
    }
}

/// A complete response, or one streamed fragment of a response.
///
/// Token counts are whatever the backend reported for this call; they are `0` when
/// the backend omits usage on the path that produced the value. When streaming,
/// counts are the latest cumulative values the backend has sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Present on full completions and on the last fragment of a stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl ChatCompletion {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// One item of a [`crate::ResultStream`].
///
/// After an `Error` or `Done` the stream yields nothing more.
#[derive(Debug)]
pub enum StreamResult {
    /// A fragment of generated text plus the usage known so far.
    Completion(ChatCompletion),
    /// The stream failed; no further items follow.
    Error(LLMError),
    /// The backend signalled the end of the response.
    Done,
}

impl StreamResult {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Completion(_))
    }

    pub fn completion(&self) -> Option<&ChatCompletion> {
        match self {
            Self::Completion(completion) => Some(completion),
            _ => None,
        }
    }
}

/// Why the backend stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

/// Sampling knobs applied to every request an adapter sends.
///
/// Unset fields are omitted from the wire payload so the backend default applies,
/// except for Anthropic's mandatory `max_tokens` (see
/// [`crate::provider::anthropic_messages::DEFAULT_MAX_TOKENS`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// Capability descriptor used to filter registered adapters at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CapabilityDescriptor {
    pub supports_stream: bool,
    pub supports_tools: bool,
    /// Whether [`crate::LLMProvider::completion`] reports real token counts.
    pub reports_completion_usage: bool,
    /// Whether streamed fragments carry token counts.
    pub reports_stream_usage: bool,
}
