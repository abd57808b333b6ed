//! Batching presets for each supported embedder.
//!
//! Hosted APIs get low concurrency ceilings and honour Retry-After; local
//! backends get larger batches, long timeouts and no rate limiting.

use std::time::Duration;

use ragbatch_core::config::ProviderKind;
use ragbatch_core::profile::classify_default;
use ragbatch_core::{EmbedError, EmbedErrorKind, EmbedderProfile, ErrorClass};

/// Retry-After hints at or below this are treated as a transient quota blip.
pub const SHORT_RETRY_AFTER: Duration = Duration::from_secs(10);

/// Hosted APIs: a 429 that asks for a short wait is retried in place
/// ("quota-with-retry"); anything longer stops the run.
pub fn classify_hosted(err: &EmbedError) -> ErrorClass {
    match (err.kind, err.retry_after) {
        (EmbedErrorKind::RateLimited, Some(wait)) if wait <= SHORT_RETRY_AFTER => ErrorClass::Retryable,
        _ => classify_default(err),
    }
}

/// Local backends: unknown failures are usually a busy or restarting server.
pub fn classify_local(err: &EmbedError) -> ErrorClass {
    match err.kind {
        EmbedErrorKind::Other => ErrorClass::Retryable,
        _ => classify_default(err),
    }
}

pub fn upstage_profile() -> EmbedderProfile {
    EmbedderProfile::new("Upstage", 32, 8)
        .with_large_job_scaling(1, 32)
        .with_retry_after(true)
        .with_timeout(Duration::from_secs(60))
        .with_classifier(classify_hosted)
}

pub fn openai_profile() -> EmbedderProfile {
    EmbedderProfile::new("OpenAI", 64, 15)
        .with_large_job_scaling(3, 200)
        .with_retry_after(true)
        .with_timeout(Duration::from_secs(60))
        .with_classifier(classify_hosted)
}

pub fn ollama_profile() -> EmbedderProfile {
    EmbedderProfile::new("Ollama", 16, 4)
        .with_large_job_scaling(2, 128)
        .with_timeout(Duration::from_secs(300))
        .with_per_item_timeout(Duration::from_secs(20))
        .with_classifier(classify_local)
}

pub fn local_profile() -> EmbedderProfile {
    EmbedderProfile::new("Local", 32, 6)
        .with_large_job_scaling(4, 256)
        .with_timeout(Duration::from_secs(600))
        .with_classifier(classify_local)
}

pub fn fake_profile() -> EmbedderProfile {
    EmbedderProfile::new("Fake", 16, 8).with_large_job_scaling(2, 100)
}

pub fn profile_for(kind: ProviderKind) -> EmbedderProfile {
    match kind {
        ProviderKind::Upstage => upstage_profile(),
        ProviderKind::OpenAi => openai_profile(),
        ProviderKind::Ollama => ollama_profile(),
        ProviderKind::Local => local_profile(),
        ProviderKind::Fake => fake_profile(),
    }
}
