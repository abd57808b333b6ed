//! In-process BGE-M3 (XLM-RoBERTa) embedder on candle.
//!
//! Forward passes are CPU/GPU bound, so each batch runs on tokio's blocking
//! pool rather than on the async workers driving the scheduler.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use ragbatch_core::{EmbedError, EmbedErrorKind, EmbedderCapability, EmbedderProfile};

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::profile::local_profile;
use crate::tokenize::tokenize_batch;

pub const EMBEDDING_DIM: usize = 1024;
pub const MAX_LEN: usize = 256;

pub struct BgeM3Model {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl BgeM3Model {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        info!(dir = %model_dir.display(), "loading BGE-M3 model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )?;
        let weights_path = model_dir.join("pytorch_model.bin");
        let weights: HashMap<String, Tensor> = candle_core::pickle::read_all(&weights_path)
            .with_context(|| format!("reading {}", weights_path.display()))?
            .into_iter()
            .collect();
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!("BGE-M3 model loaded");
        Ok(Self { model, tokenizer, device })
    }

    /// One L2-normalised `EMBEDDING_DIM` vector per input.
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, MAX_LEN, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        debug!(count = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "local batch embedded");
        Ok(vectors)
    }
}

pub struct LocalEmbedder {
    model: Arc<BgeM3Model>,
    profile: EmbedderProfile,
}

impl LocalEmbedder {
    pub fn load(model_dir: Option<&str>) -> Result<Self> {
        let dir = resolve_model_dir(model_dir)?;
        Ok(Self { model: Arc::new(BgeM3Model::load(&dir)?), profile: local_profile() })
    }

    pub fn with_profile(mut self, profile: EmbedderProfile) -> Self {
        self.profile = profile;
        self
    }
}

#[async_trait]
impl EmbedderCapability for LocalEmbedder {
    fn name(&self) -> &str {
        "Local"
    }

    fn profile(&self) -> &EmbedderProfile {
        &self.profile
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || model.embed_batch(&texts))
            .await
            .map_err(|e| EmbedError::new(EmbedErrorKind::Other, format!("local embedding task aborted: {}", e)))?
            .map_err(|e| EmbedError::new(EmbedErrorKind::Other, format!("local embedding failed: {}", e)))
    }
}

/// Configured directory first, then `APP_MODEL_DIR`, `MODEL_DIR`, then the conventional locations.
pub fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    let candidates = configured
        .map(ragbatch_core::config::expand_path)
        .into_iter()
        .chain(std::env::var("APP_MODEL_DIR").ok().map(PathBuf::from))
        .chain(std::env::var("MODEL_DIR").ok().map(PathBuf::from))
        .chain([PathBuf::from("../models/bge-m3"), PathBuf::from("models/bge-m3")]);
    for dir in candidates {
        if dir.exists() {
            debug!(dir = %dir.display(), "using model dir");
            return Ok(dir);
        }
    }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}
