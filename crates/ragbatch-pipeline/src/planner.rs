//! Batch size and concurrency for one run.
//!
//! Three tiers by chunk count: small jobs favour latency with tiny batches,
//! medium jobs use the provider's base size, large jobs scale it up to the
//! provider's absolute ceiling.

use serde::{Deserialize, Serialize};

use ragbatch_core::EmbedderProfile;

/// Jobs up to this many chunks use [`SMALL_JOB_BATCH_SIZE`].
pub const SMALL_JOB_MAX_CHUNKS: usize = 50;
/// Jobs up to this many chunks use the profile's base batch size.
pub const MEDIUM_JOB_MAX_CHUNKS: usize = 200;
pub const SMALL_JOB_BATCH_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub batch_size: usize,
    pub concurrency: usize,
    pub total_batches: usize,
}

pub fn batch_size_for(chunk_count: usize, profile: &EmbedderProfile) -> usize {
    let base = profile.base_batch_size.max(1);
    let size = if chunk_count <= SMALL_JOB_MAX_CHUNKS {
        SMALL_JOB_BATCH_SIZE.min(base)
    } else if chunk_count <= MEDIUM_JOB_MAX_CHUNKS {
        base
    } else {
        base.saturating_mul(profile.large_job_multiplier.max(1)).min(profile.max_batch_size)
    };
    size.max(1)
}

/// Pure; never fails. An empty job plans zero batches with concurrency 1.
pub fn plan(chunk_count: usize, profile: &EmbedderProfile) -> BatchPlan {
    let batch_size = batch_size_for(chunk_count, profile);
    let total_batches = chunk_count.div_ceil(batch_size);
    let concurrency = profile.max_concurrent_batches.min(total_batches).max(1);
    BatchPlan { batch_size, concurrency, total_batches }
}
