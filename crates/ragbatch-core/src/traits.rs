use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::profile::EmbedderProfile;

/// Provider-neutral reason an embedding request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbedErrorKind {
    Timeout,
    Network,
    RateLimited,
    Unauthorized,
    Forbidden,
    TooLarge,
    InvalidRequest,
    ServerError,
    Other,
}

impl EmbedErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network error",
            Self::RateLimited => "rate limited",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::TooLarge => "request too large",
            Self::InvalidRequest => "invalid request",
            Self::ServerError => "server error",
            Self::Other => "error",
        }
    }
}

impl fmt::Display for EmbedErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by an embedder for one request.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct EmbedError {
    pub kind: EmbedErrorKind,
    pub message: String,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Provider hint for how long to wait before trying again.
    pub retry_after: Option<Duration>,
}

impl EmbedError {
    pub fn new(kind: EmbedErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), status: None, retry_after: None }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(EmbedErrorKind::Timeout, format!("no response within {:.1}s", after.as_secs_f64()))
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(EmbedErrorKind::Network, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// "Embed a batch of strings, return vectors or fail."
///
/// Implementations own their provider configuration (endpoint, model, key).
/// `embed` must return exactly one vector per input, in input order.
#[async_trait]
pub trait EmbedderCapability: Send + Sync {
    fn name(&self) -> &str;

    /// Static batching and concurrency limits advertised by this provider.
    fn profile(&self) -> &EmbedderProfile;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Cheap reachability probe awaited once before a run dispatches anything.
    async fn check_ready(&self) -> Result<(), EmbedError> {
        Ok(())
    }
}
