use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use ragbatch_core::{EmbedError, EmbedErrorKind, EmbedderCapability, EmbedderProfile};

use crate::http;
use crate::profile::ollama_profile;

pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
pub const OLLAMA_DEFAULT_MODEL: &str = "nomic-embed-text";

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Embeddings from a local Ollama server (`POST /api/embed`).
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    profile: EmbedderProfile,
}

impl OllamaEmbedder {
    /// `base_url`/`model` fall back to `OLLAMA_URL`/`OLLAMA_EMBED_MODEL`, then built-in defaults.
    pub fn new(base_url: Option<&str>, model: Option<&str>) -> Self {
        let base_url = base_url
            .map(str::to_string)
            .or_else(|| std::env::var("OLLAMA_URL").ok())
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());
        let model = model
            .map(str::to_string)
            .or_else(|| std::env::var("OLLAMA_EMBED_MODEL").ok())
            .unwrap_or_else(|| OLLAMA_DEFAULT_MODEL.to_string());
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: with_default_tag(&model),
            profile: ollama_profile(),
        }
    }

    pub fn with_profile(mut self, profile: EmbedderProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn installed_models(&self) -> Result<Vec<String>, EmbedError> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self.client.get(&url).timeout(PROBE_TIMEOUT).send().await.map_err(|e| {
            EmbedError::network(format!("Cannot connect to Ollama at {}. Please ensure Ollama is running ({})", self.base_url, e))
        })?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(http::from_status(status, &body, None));
        }
        let tags: TagsResponse = resp.json().await.map_err(|e| http::from_reqwest(&e))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Ollama resolves untagged names to `:latest`.
pub fn with_default_tag(model: &str) -> String {
    let model = model.trim();
    if model.contains(':') { model.to_string() } else { format!("{}:latest", model) }
}

#[async_trait]
impl EmbedderCapability for OllamaEmbedder {
    fn name(&self) -> &str {
        "Ollama"
    }

    fn profile(&self) -> &EmbedderProfile {
        &self.profile
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, count = texts.len(), "calling Ollama embed API");
        let request = EmbedRequest { model: &self.model, input: texts };
        let resp = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .timeout(self.profile.attempt_timeout(texts.len()))
            .json(&request)
            .send()
            .await
            .map_err(|e| http::from_reqwest(&e))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(EmbedError::new(
                EmbedErrorKind::InvalidRequest,
                format!("Model '{}' not found. Please ensure the model is installed in Ollama", self.model),
            )
            .with_status(404));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(http::from_status(status, &body, None));
        }
        let parsed: EmbedResponse = resp.json().await.map_err(|e| http::from_reqwest(&e))?;
        if parsed.embeddings.is_empty() {
            return Err(EmbedError::new(EmbedErrorKind::Other, "No embeddings returned from Ollama"));
        }
        if parsed.embeddings.len() != texts.len() {
            return Err(EmbedError::new(
                EmbedErrorKind::Other,
                format!("Embedding count mismatch: expected {}, got {}", texts.len(), parsed.embeddings.len()),
            ));
        }
        Ok(parsed.embeddings)
    }

    /// The server must be up and the configured model pulled.
    async fn check_ready(&self) -> Result<(), EmbedError> {
        let models = self.installed_models().await?;
        if !models.iter().any(|m| with_default_tag(m) == self.model) {
            return Err(EmbedError::new(
                EmbedErrorKind::InvalidRequest,
                format!("Model '{}' is not installed in Ollama (try `ollama pull {}`)", self.model, self.model),
            ));
        }
        info!(url = %self.base_url, model = %self.model, "Ollama is ready");
        Ok(())
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}
