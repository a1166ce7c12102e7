// Shared request plumbing for the embedding clients

use std::time::Duration;
use tracing::{debug, error, warn};
use ureq::Body;
use ureq::http::Response;

use crate::{IndexError, Result};

pub(crate) const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub(crate) const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub(crate) const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const MAX_RESPONSE_BYTES: u64 = 256 * 1024 * 1024;

/// Build an agent that hands non-2xx responses back to us so the endpoint's
/// error body can be reported.
pub(crate) fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Retry settings for one client
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Run `request_fn` until it yields a 2xx body.
///
/// Server errors (5xx) and transport failures are retried with exponential
/// backoff. Client errors, rate limiting (429) included, are returned at
/// once with the endpoint's status and message.
pub(crate) fn request_with_retry<F>(
    endpoint: &str,
    policy: RetryPolicy,
    mut request_fn: F,
) -> Result<String>
where
    F: FnMut() -> std::result::Result<Response<Body>, ureq::Error>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        debug!("HTTP request attempt {}/{} to {}", attempt, attempts, endpoint);

        match request_fn() {
            Ok(mut response) => {
                let status = response.status().as_u16();
                let body = response
                    .body_mut()
                    .with_config()
                    .limit(MAX_RESPONSE_BYTES)
                    .read_to_string()
                    .map_err(|e| {
                        IndexError::embedding(
                            Some(status),
                            format!("Failed to read response body: {}", e),
                        )
                    })?;

                if (200..300).contains(&status) {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(body);
                }

                let message = extract_error_message(&body);
                if status >= 500 {
                    warn!(
                        "Server error (status {}), attempt {}/{}",
                        status, attempt, attempts
                    );
                    last_error = Some(IndexError::embedding(Some(status), message));
                } else {
                    warn!("Client error (status {}), not retrying: {}", status, message);
                    return Err(IndexError::embedding(Some(status), message));
                }
            }
            Err(
                error @ (ureq::Error::ConnectionFailed
                | ureq::Error::HostNotFound
                | ureq::Error::Timeout(_)
                | ureq::Error::Io(_)),
            ) => {
                warn!(
                    "Transport error: {}, attempt {}/{}",
                    error, attempt, attempts
                );
                last_error = Some(IndexError::embedding(
                    None,
                    format!("Request error: {}", error),
                ));
            }
            Err(error) => {
                warn!("Non-retryable error: {}", error);
                return Err(IndexError::embedding(
                    None,
                    format!("Non-retryable error: {}", error),
                ));
            }
        }

        // Wait before retry (exponential backoff)
        if attempt < attempts {
            let delay = policy.backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
            debug!("Waiting {:?} before retry", delay);
            std::thread::sleep(delay);
        }
    }

    error!("All retry attempts failed for request to {}", endpoint);

    Err(last_error
        .unwrap_or_else(|| IndexError::embedding(None, "Request failed after retries")))
}

/// Pull a human-readable message out of an error body.
///
/// Understands `{"error": "..."}` (Ollama), `{"error": {"message": "..."}}`
/// (OpenAI) and `{"detail": "..."}`; anything else is returned trimmed.
pub(crate) fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let message = value
            .get("error")
            .and_then(|error| {
                error
                    .as_str()
                    .or_else(|| error.get("message").and_then(serde_json::Value::as_str))
            })
            .or_else(|| value.get("detail").and_then(serde_json::Value::as_str))
            .or_else(|| value.get("message").and_then(serde_json::Value::as_str));
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.chars().take(500).collect()
    }
}
