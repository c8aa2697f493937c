use std::time::Duration;

use thiserror::Error;

use crate::tool::ToolError;

/// Aggregates every failure mode exposed by the unified chat client.
///
/// Vendor failures are classified into the transport-facing variants (`Transport`,
/// `Auth`, `RateLimit`, ...), while tool-calling and cancellation failures keep
/// their own variants so callers can match on them without string inspection.
#[derive(Debug, Error)]
pub enum LLMError {
    /// Represents transport-layer or networking failures.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Reports invalid or missing credentials.
    #[error("auth failure: {message}")]
    Auth { message: String },
    /// Indicates that the backend throttled the request.
    #[error("rate limited: {message}")]
    RateLimit {
        message: String,
        /// Wait duration suggested by the backend, when it sent one.
        retry_after: Option<Duration>,
    },
    /// The prompt or requested completion does not fit the model's context window.
    #[error("token limit exceeded: {message}")]
    TokenLimitExceeded { message: String },
    /// Signals validation failures in the request payload.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// Indicates that the requested model could not be resolved by the backend.
    #[error("model not found: {message}")]
    ModelNotFound {
        /// Model identifier extracted from the error payload when available.
        model: Option<String>,
        message: String,
    },
    /// Raised when building an adapter from configuration fails.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
    /// A tool's parameter schema cannot be expressed in the backend's native format.
    #[error("invalid schema for tool {tool}: {message}")]
    Schema { tool: String, message: String },
    /// The backend answered a tool-augmented request without requesting any function.
    #[error("no function call found in {provider} response")]
    NoFunctionCall { provider: &'static str },
    /// The backend requested a function that is not part of the supplied tool set.
    #[error("model requested unknown tool: {name}")]
    UnknownTool { name: String },
    /// The invoked tool itself failed.
    #[error("tool {name} failed: {source}")]
    Tool {
        name: String,
        #[source]
        source: ToolError,
    },
    /// The call context was cancelled or its deadline passed.
    #[error("request cancelled: {message}")]
    Cancelled { message: String },
    /// A streaming body ended before the backend's terminal event.
    #[error("stream closed unexpectedly: {message}")]
    StreamClosed { message: String },
    /// Wraps backend errors that cannot be normalized.
    #[error("provider {provider} error: {message}")]
    Provider {
        /// Name of the adapter, such as `google_gemini`.
        provider: &'static str,
        message: String,
    },
}

impl LLMError {
    /// Creates an [`LLMError::Transport`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use relay_llm::error::LLMError;
    ///
    /// let err = LLMError::transport("dns lookup failed");
    /// assert!(matches!(err, LLMError::Transport { .. }));
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Provider`] tagged with the adapter name.
    ///
    /// # Examples
    ///
    /// ```
    /// use relay_llm::error::LLMError;
    ///
    /// let err = LLMError::provider("google_gemini", "bad JSON payload");
    /// assert!(matches!(err, LLMError::Provider { provider: "google_gemini", .. }));
    /// ```
    pub fn provider<T: Into<String>>(provider: &'static str, message: T) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Cancelled`].
    pub fn cancelled<T: Into<String>>(message: T) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Returns `true` for [`LLMError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Returns `true` when an error code or message suggests a context window overflow.
pub(crate) fn looks_like_token_limit_error(code_hint: Option<&str>, message: &str) -> bool {
    if let Some(code) = code_hint {
        let lower = code.to_ascii_lowercase();
        if matches!(
            lower.as_str(),
            "context_length_exceeded" | "prompt_tokens_exceeded" | "context_window_exceeded"
        ) {
            return true;
        }
    }

    let lower_message = message.to_ascii_lowercase();
    const HINTS: [&str; 6] = [
        "context length",
        "context window",
        "token limit",
        "prompt is too long",
        "exceeds the maximum number of tokens",
        "input token count",
    ];
    HINTS.iter().any(|needle| lower_message.contains(needle))
}

/// Attempts to pull a quoted model identifier out of an error message.
pub(crate) fn extract_model_identifier(message: &str) -> Option<String> {
    ['`', '"', '\''].into_iter().find_map(|delimiter| {
        quoted_segment(message, delimiter)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

fn quoted_segment(message: &str, delimiter: char) -> Option<&str> {
    let start = message.find(delimiter)? + delimiter.len_utf8();
    let rest = &message[start..];
    let end = rest.find(delimiter)?;
    Some(&rest[..end])
}
