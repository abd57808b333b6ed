//! Translate HTTP-level failures into `EmbedError`s.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;

use ragbatch_core::{EmbedError, EmbedErrorKind};

const BODY_SNIPPET_CHARS: usize = 200;

/// Delay-seconds form only; HTTP dates and out-of-range values yield `None`.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    raw.parse::<u64>().ok().map(Duration::from_secs)
}

fn snippet(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= BODY_SNIPPET_CHARS {
        return body.to_string();
    }
    let cut: String = body.chars().take(BODY_SNIPPET_CHARS).collect();
    format!("{}...", cut)
}

pub fn from_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> EmbedError {
    let code = status.as_u16();
    let (kind, message) = match code {
        429 => {
            let hint = retry_after.map(|d| format!(". Retry after {} seconds", d.as_secs())).unwrap_or_default();
            (EmbedErrorKind::RateLimited, format!("Rate limit exceeded{}", hint))
        }
        401 => (EmbedErrorKind::Unauthorized, "Invalid API key".to_string()),
        403 => (EmbedErrorKind::Forbidden, "API key lacks required permissions".to_string()),
        413 => (EmbedErrorKind::TooLarge, "Batch size exceeds API limits".to_string()),
        400 | 404 | 422 => (EmbedErrorKind::InvalidRequest, format!("{} - {}", status, snippet(body))),
        c if c >= 500 => (EmbedErrorKind::ServerError, format!("Server error: {} - {}", status, snippet(body))),
        _ => (EmbedErrorKind::Other, format!("Request failed with status {}: {}", status, snippet(body))),
    };
    let err = EmbedError::new(kind, message).with_status(code);
    match retry_after {
        Some(wait) => err.with_retry_after(wait),
        None => err,
    }
}

pub fn from_reqwest(err: &reqwest::Error) -> EmbedError {
    if err.is_timeout() {
        return EmbedError::new(EmbedErrorKind::Timeout, format!("Request timeout: {}", err));
    }
    if let Some(status) = err.status() {
        return from_status(status, &err.to_string(), None);
    }
    if err.is_decode() {
        return EmbedError::new(EmbedErrorKind::Other, format!("Malformed response: {}", err));
    }
    EmbedError::network(format!("Network error: {}", err))
}
