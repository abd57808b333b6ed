//! Embeddings client for OpenAI-compatible `/embeddings` endpoints.
//!
//! Used for both OpenAI and Upstage Solar, which share the request and
//! response shape and differ only in base URL, models and batching profile.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use ragbatch_core::redact::mask_key;
use ragbatch_core::{EmbedError, EmbedErrorKind, EmbedderCapability, EmbedderProfile};

use crate::http;
use crate::profile::{openai_profile, upstage_profile};

pub const UPSTAGE_BASE_URL: &str = "https://api.upstage.ai/v1/solar";
pub const UPSTAGE_DEFAULT_MODEL: &str = "embedding-passage";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "text-embedding-3-small";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct OpenAiCompatibleEmbedder {
    name: String,
    client: Client,
    endpoint: String,
    model: String,
    profile: EmbedderProfile,
}

impl OpenAiCompatibleEmbedder {
    pub fn new(name: &str, api_key: &str, base_url: &str, model: &str, profile: EmbedderProfile) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing {} API key", name);
        anyhow::ensure!(!model.trim().is_empty(), "missing {} model name", name);
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&auth).context("invalid API key characters")?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .default_headers(headers)
            .build()
            .with_context(|| format!("failed to build {} HTTP client", name))?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        debug!(provider = name, endpoint = %endpoint, key = %mask_key(api_key), "embedder configured");
        Ok(Self { name: name.to_string(), client, endpoint, model: model.to_string(), profile })
    }

    pub fn upstage(api_key: &str, base_url: Option<&str>, model: Option<&str>) -> Result<Self> {
        Self::new(
            "Upstage",
            api_key,
            base_url.unwrap_or(UPSTAGE_BASE_URL),
            model.unwrap_or(UPSTAGE_DEFAULT_MODEL),
            upstage_profile(),
        )
    }

    pub fn openai(api_key: &str, base_url: Option<&str>, model: Option<&str>) -> Result<Self> {
        Self::new(
            "OpenAI",
            api_key,
            base_url.unwrap_or(OPENAI_BASE_URL),
            model.unwrap_or(OPENAI_DEFAULT_MODEL),
            openai_profile(),
        )
    }

    pub fn with_profile(mut self, profile: EmbedderProfile) -> Self {
        self.profile = profile;
        self
    }
}

#[async_trait]
impl EmbedderCapability for OpenAiCompatibleEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn profile(&self) -> &EmbedderProfile {
        &self.profile
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest { model: &self.model, input: texts };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| http::from_reqwest(&e))?;
        let status = resp.status();
        if !status.is_success() {
            let retry_after = http::retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(http::from_status(status, &body, retry_after));
        }
        let mut parsed: EmbeddingResponse = resp.json().await.map_err(|e| http::from_reqwest(&e))?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != texts.len() {
            return Err(EmbedError::new(
                EmbedErrorKind::Other,
                format!("Mismatch in embedding count: got {}, expected {}", parsed.data.len(), texts.len()),
            ));
        }
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}
