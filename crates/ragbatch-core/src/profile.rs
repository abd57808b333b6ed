//! Static per-provider batching limits and error classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::traits::{EmbedError, EmbedErrorKind};

/// How the scheduler reacts to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Provider throttling; stop dispatching new batches.
    RateLimited,
    /// Transient; retry the same batch with backoff.
    Retryable,
    /// Credentials rejected; every remaining batch would fail the same way.
    AuthFatal,
    /// The request itself is bad; fail this batch only.
    RequestFatal,
}

impl ErrorClass {
    pub fn aborts_run(&self) -> bool {
        matches!(self, Self::RateLimited | Self::AuthFatal)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RateLimited => "rate limited",
            Self::Retryable => "retryable",
            Self::AuthFatal => "authentication failure",
            Self::RequestFatal => "request rejected",
        };
        f.write_str(s)
    }
}

pub type Classifier = fn(&EmbedError) -> ErrorClass;

/// Read-only limits for one embedder selection.
#[derive(Debug, Clone)]
pub struct EmbedderProfile {
    pub name: String,
    pub base_batch_size: usize,
    /// Applied to `base_batch_size` for large jobs.
    pub large_job_multiplier: usize,
    /// Absolute per-request ceiling, whatever the tier.
    pub max_batch_size: usize,
    pub max_concurrent_batches: usize,
    pub supports_retry_after: bool,
    /// Per-attempt timeout.
    pub request_timeout: Duration,
    /// Extra allowance per chunk for slow local backends.
    pub per_item_timeout: Option<Duration>,
    pub classify: Classifier,
}

impl EmbedderProfile {
    pub fn new(name: impl Into<String>, base_batch_size: usize, max_concurrent_batches: usize) -> Self {
        let base = base_batch_size.max(1);
        Self {
            name: name.into(),
            base_batch_size: base,
            large_job_multiplier: 2,
            max_batch_size: base.saturating_mul(2),
            max_concurrent_batches: max_concurrent_batches.max(1),
            supports_retry_after: false,
            request_timeout: Duration::from_secs(30),
            per_item_timeout: None,
            classify: classify_default,
        }
    }

    pub fn with_large_job_scaling(mut self, multiplier: usize, ceiling: usize) -> Self {
        self.large_job_multiplier = multiplier.max(1);
        self.max_batch_size = ceiling.max(1);
        self
    }

    pub fn with_retry_after(mut self, supported: bool) -> Self {
        self.supports_retry_after = supported;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_per_item_timeout(mut self, per_item: Duration) -> Self {
        self.per_item_timeout = Some(per_item);
        self
    }

    pub fn with_classifier(mut self, classify: Classifier) -> Self {
        self.classify = classify;
        self
    }

    pub fn classify(&self, err: &EmbedError) -> ErrorClass {
        (self.classify)(err)
    }

    /// Timeout for one attempt at a batch of `batch_len` chunks.
    pub fn attempt_timeout(&self, batch_len: usize) -> Duration {
        match self.per_item_timeout {
            Some(per_item) => {
                let n = u32::try_from(batch_len).unwrap_or(u32::MAX);
                self.request_timeout.max(per_item.saturating_mul(n))
            }
            None => self.request_timeout,
        }
    }
}

/// Mapping shared by every provider unless it overrides specific kinds.
pub fn classify_default(err: &EmbedError) -> ErrorClass {
    match err.kind {
        EmbedErrorKind::RateLimited => ErrorClass::RateLimited,
        EmbedErrorKind::Unauthorized | EmbedErrorKind::Forbidden => ErrorClass::AuthFatal,
        EmbedErrorKind::TooLarge | EmbedErrorKind::InvalidRequest | EmbedErrorKind::Other => ErrorClass::RequestFatal,
        EmbedErrorKind::Timeout | EmbedErrorKind::Network | EmbedErrorKind::ServerError => ErrorClass::Retryable,
    }
}
