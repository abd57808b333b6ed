use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use ragbatch_core::{EmbedError, EmbedderCapability, EmbedderProfile};

use crate::profile::fake_profile;

/// Deterministic hashed bag-of-words vectors, L2-normalised.
///
/// Same text, same vector; no model or network needed.
pub struct FakeEmbedder {
    dim: usize,
    profile: EmbedderProfile,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1), profile: fake_profile() }
    }

    pub fn with_profile(mut self, profile: EmbedderProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

#[async_trait]
impl EmbedderCapability for FakeEmbedder {
    fn name(&self) -> &str {
        "Fake"
    }

    fn profile(&self) -> &EmbedderProfile {
        &self.profile
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
