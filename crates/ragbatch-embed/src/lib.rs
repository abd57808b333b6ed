//! Concrete embedder capabilities and their batching profiles.
//!
//! `build_embedder` turns an explicit `EmbedderSettings` into a ready-to-use
//! capability; nothing here keeps a process-wide default.

pub mod device;
pub mod fake;
pub mod http;
pub mod local;
pub mod ollama;
pub mod openai;
pub mod pool;
pub mod profile;
pub mod tokenize;

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;

use ragbatch_core::config::{EmbedderSettings, ProviderKind};
use ragbatch_core::{EmbedderCapability, EmbedderProfile};

pub use fake::FakeEmbedder;
pub use local::{BgeM3Model, LocalEmbedder};
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiCompatibleEmbedder;
pub use pool::masked_mean_l2;
pub use profile::profile_for;

pub const FAKE_DIM: usize = 1024;

/// Profile for `settings.provider` with any configured timeout override applied.
pub fn resolve_profile(settings: &EmbedderSettings) -> EmbedderProfile {
    let profile = profile_for(settings.provider);
    match settings.request_timeout_secs {
        Some(secs) if secs > 0 => profile.with_timeout(Duration::from_secs(secs)),
        _ => profile,
    }
}

pub fn build_embedder(settings: &EmbedderSettings) -> Result<Arc<dyn EmbedderCapability>> {
    let profile = resolve_profile(settings);
    let model = settings.model.as_deref();
    let base_url = settings.base_url.as_deref();
    let embedder: Arc<dyn EmbedderCapability> = match settings.provider {
        ProviderKind::Upstage | ProviderKind::OpenAi => {
            let key = settings
                .resolve_api_key()
                .ok_or_else(|| anyhow!("no API key configured for {:?}", settings.provider))?;
            let client = if settings.provider == ProviderKind::Upstage {
                OpenAiCompatibleEmbedder::upstage(&key, base_url, model)?
            } else {
                OpenAiCompatibleEmbedder::openai(&key, base_url, model)?
            };
            Arc::new(client.with_profile(profile))
        }
        ProviderKind::Ollama => Arc::new(OllamaEmbedder::new(base_url, model).with_profile(profile)),
        ProviderKind::Local => Arc::new(LocalEmbedder::load(settings.model_dir.as_deref())?.with_profile(profile)),
        ProviderKind::Fake => Arc::new(FakeEmbedder::new(FAKE_DIM).with_profile(profile)),
    };
    tracing::info!(provider = embedder.name(), "embedder ready");
    Ok(embedder)
}
