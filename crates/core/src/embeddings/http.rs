//! Request plumbing shared by the remote embedding backends.

use crate::error::EmbeddingError;
use crate::retry::{classify_status, is_transient_transport, StatusClass};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::error;

const MAX_ERROR_SNIPPET: usize = 300;

pub(crate) async fn send_json<R: DeserializeOwned>(
    provider: &'static str,
    request: RequestBuilder,
) -> Result<R, EmbeddingError> {
    let response = request.send().await.map_err(|error| {
        error!(provider, error = %error, "request failed");
        transport_error(provider, &error)
    })?;

    let status = response.status();
    let class = classify_status(status);
    if class == StatusClass::Success {
        return response.json::<R>().await.map_err(|error| EmbeddingError::Decode {
            provider,
            message: error.to_string(),
        });
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    error!(provider, %status, "embedding API error");
    Err(match class {
        StatusClass::RateLimited => EmbeddingError::RateLimited { provider, message },
        StatusClass::Unavailable => EmbeddingError::Unavailable {
            provider,
            message: format!("HTTP {status}: {message}"),
        },
        _ => EmbeddingError::Rejected {
            provider,
            status: status.as_u16(),
            message,
        },
    })
}

fn transport_error(provider: &'static str, error: &reqwest::Error) -> EmbeddingError {
    if is_transient_transport(error) {
        EmbeddingError::Unavailable {
            provider,
            message: error.to_string(),
        }
    } else {
        EmbeddingError::Transport {
            provider,
            message: error.to_string(),
        }
    }
}

/// Pulls a human-readable message out of the error bodies the vendors return
/// (`{"error": {"message": ..}}`, `{"error": ".."}`), falling back to the raw body.
pub(crate) fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let extracted = parsed.as_ref().and_then(|value| {
        value
            .pointer("/error/message")
            .or_else(|| value.get("error"))
            .or_else(|| value.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    let message = extracted.unwrap_or_else(|| body.trim().to_string());
    if message.chars().count() > MAX_ERROR_SNIPPET {
        message.chars().take(MAX_ERROR_SNIPPET).collect::<String>() + "..."
    } else {
        message
    }
}
