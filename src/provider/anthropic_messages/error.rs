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
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Parses error responses returned by the Anthropic Messages API.
pub(crate) fn parse_anthropic_error(
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

    let kind = error.kind.as_deref().filter(|kind| !kind.is_empty());
    let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
    if let Some(kind) = kind {
        message = format!("{message} ({kind})");
    }
    warn!(provider = PROVIDER_NAME, status, %message, "request failed");

    if looks_like_token_limit_error(kind, &message) {
        return LLMError::TokenLimitExceeded { message };
    }

    // Stream `error` events arrive after a 200; the error type carries the real status.
    let status = match (status, kind) {
        (200..=299, Some(kind)) => status_for_error_type(kind).unwrap_or(status),
        _ => status,
    };

    match status {
        404 => LLMError::ModelNotFound {
            model: extract_model_identifier(&message),
            message,
        },
        401 | 403 => LLMError::Auth { message },
        429 => LLMError::RateLimit {
            message,
            retry_after,
        },
        400 | 413 => LLMError::Validation { message },
        _ => LLMError::provider(PROVIDER_NAME, message),
    }
}

fn status_for_error_type(kind: &str) -> Option<u16> {
    let status = match kind {
        "invalid_request_error" => 400,
        "authentication_error" => 401,
        "permission_error" => 403,
        "not_found_error" => 404,
        "request_too_large" => 413,
        "rate_limit_error" => 429,
        "api_error" => 500,
        "overloaded_error" => 529,
        _ => return None,
    };
    Some(status)
}
