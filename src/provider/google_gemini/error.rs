use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::{LLMError, extract_model_identifier, looks_like_token_limit_error};

use super::PROVIDER_NAME;

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<InnerError>,
}

#[derive(Deserialize)]
struct InnerError {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

/// Classifies a Google RPC error payload (Developer API and Vertex share the shape).
pub(crate) fn parse_gemini_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    let Some(error) = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
    else {
        warn!(provider = PROVIDER_NAME, status, "unparseable error body");
        return LLMError::provider(PROVIDER_NAME, format!("status {status}: {body}"));
    };

    let rpc_status = error.status.as_deref().filter(|s| !s.is_empty());
    let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
    if let Some(rpc_status) = rpc_status {
        message = format!("{message} ({rpc_status})");
    }
    warn!(provider = PROVIDER_NAME, status, %message, "request failed");

    if looks_like_token_limit_error(rpc_status, &message) {
        return LLMError::TokenLimitExceeded { message };
    }

    // Mid-stream errors arrive with HTTP 200; the RPC code carries the real status.
    let status = match (status, error.code) {
        (200..=299, Some(code)) => code,
        _ => status,
    };

    match (status, rpc_status) {
        (404, _) | (_, Some("NOT_FOUND")) => LLMError::ModelNotFound {
            model: extract_model_identifier(&message),
            message,
        },
        (401 | 403, _) | (_, Some("UNAUTHENTICATED" | "PERMISSION_DENIED")) => {
            LLMError::Auth { message }
        }
        (429, _) | (_, Some("RESOURCE_EXHAUSTED")) => LLMError::RateLimit {
            message,
            retry_after,
        },
        (400, _) | (_, Some("INVALID_ARGUMENT" | "FAILED_PRECONDITION")) => {
            LLMError::Validation { message }
        }
        _ => LLMError::provider(PROVIDER_NAME, message),
    }
}
