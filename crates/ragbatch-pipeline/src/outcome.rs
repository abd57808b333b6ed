//! Per-batch outcomes and the aggregate result of a run.

use serde::Serialize;
use std::fmt;

use ragbatch_core::{ChunkId, EmbeddedChunk, ErrorClass};

use crate::batch::Batch;
use crate::planner::BatchPlan;

/// Why dispatch stopped before every batch was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AbortReason {
    RateLimited,
    AuthFatal,
    Cancelled,
}

impl AbortReason {
    pub fn from_class(class: ErrorClass) -> Option<Self> {
        if !class.aborts_run() {
            return None;
        }
        Some(match class {
            ErrorClass::RateLimited => Self::RateLimited,
            _ => Self::AuthFatal,
        })
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RateLimited => "provider rate limit",
            Self::AuthFatal => "credentials rejected",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    RateLimited,
    /// Every attempt failed with a retryable error.
    RetriesExhausted,
    AuthFatal,
    RequestFatal,
    /// Never dispatched because the run stopped first.
    NotAttempted(AbortReason),
}

impl FailureKind {
    pub fn from_class(class: ErrorClass) -> Self {
        match class {
            ErrorClass::RateLimited => Self::RateLimited,
            ErrorClass::Retryable => Self::RetriesExhausted,
            ErrorClass::AuthFatal => Self::AuthFatal,
            ErrorClass::RequestFatal => Self::RequestFatal,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => f.write_str("rate limited"),
            Self::RetriesExhausted => f.write_str("retries exhausted"),
            Self::AuthFatal => f.write_str("authentication failed"),
            Self::RequestFatal => f.write_str("request rejected"),
            Self::NotAttempted(reason) => write!(f, "not attempted ({})", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// One vector per chunk, in batch order.
    Success { vectors: Vec<Vec<f32>>, attempts_made: u32 },
    Failure { kind: FailureKind, attempts_made: u32, last_error: String },
}

impl BatchOutcome {
    pub fn attempts_made(&self) -> u32 {
        match self {
            Self::Success { attempts_made, .. } | Self::Failure { attempts_made, .. } => *attempts_made,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedBatch {
    pub batch_index: usize,
    pub chunk_ids: Vec<ChunkId>,
    pub kind: FailureKind,
    pub attempts_made: u32,
    pub last_error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunVerdict {
    /// Every chunk has a vector.
    Complete,
    /// Usable, but some chunks are missing.
    Partial,
    /// Success rate below the failure threshold.
    Failed,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    /// Vectors for chunks whose batch succeeded, in input order. Not padded.
    pub vectors: Vec<EmbeddedChunk>,
    /// Sorted by batch index.
    pub failed_batches: Vec<FailedBatch>,
    pub success_rate: f64,
    pub elapsed_seconds: f64,
    pub total_chunks: usize,
    pub total_batches: usize,
    pub plan: BatchPlan,
    /// Attempts made per batch, by batch index; 0 for batches never dispatched.
    pub batch_attempts: Vec<u32>,
    pub aborted: Option<AbortReason>,
    pub failure_threshold: f64,
}

impl RunResult {
    pub fn succeeded_chunks(&self) -> usize {
        self.vectors.len()
    }

    pub fn failed_chunks(&self) -> usize {
        self.total_chunks - self.vectors.len()
    }

    fn never_dispatched(&self) -> impl Iterator<Item = &FailedBatch> {
        self.failed_batches.iter().filter(|b| matches!(b.kind, FailureKind::NotAttempted(_)))
    }

    /// Batches that were dispatched and settled, successfully or not.
    pub fn settled_batches(&self) -> usize {
        self.total_batches.saturating_sub(self.never_dispatched().count())
    }

    /// Chunks whose batch was dispatched and settled.
    pub fn settled_chunks(&self) -> usize {
        let skipped: usize = self.never_dispatched().map(|b| b.chunk_ids.len()).sum();
        self.total_chunks.saturating_sub(skipped)
    }

    pub fn verdict(&self) -> RunVerdict {
        if self.vectors.len() == self.total_chunks {
            RunVerdict::Complete
        } else if self.success_rate < self.failure_threshold {
            RunVerdict::Failed
        } else {
            RunVerdict::Partial
        }
    }

    pub fn missing_chunk_ids(&self) -> Vec<ChunkId> {
        self.failed_batches.iter().flat_map(|b| b.chunk_ids.iter().copied()).collect()
    }

    /// Chunks succeeded vs failed, then one line per failed batch.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{}/{} chunks embedded, {} failed in {:.1}s (success rate: {:.1}%)",
            self.succeeded_chunks(),
            self.total_chunks,
            self.failed_chunks(),
            self.elapsed_seconds,
            self.success_rate * 100.0
        );
        if let Some(reason) = self.aborted {
            out.push_str(&format!("; run stopped early: {}", reason));
        }
        for failed in &self.failed_batches {
            out.push_str(&format!(
                "\n  batch {} ({} chunks): {} after {} attempt(s): {}",
                failed.batch_index + 1,
                failed.chunk_ids.len(),
                failed.kind,
                failed.attempts_made,
                failed.last_error
            ));
        }
        out
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            total_chunks: self.total_chunks,
            succeeded_chunks: self.succeeded_chunks(),
            failed_chunks: self.failed_chunks(),
            total_batches: self.total_batches,
            success_rate: self.success_rate,
            elapsed_seconds: self.elapsed_seconds,
            verdict: self.verdict(),
            aborted: self.aborted,
            plan: self.plan,
            failed_batches: self.failed_batches.clone(),
        }
    }
}

/// Serializable run summary without the vectors.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub total_chunks: usize,
    pub succeeded_chunks: usize,
    pub failed_chunks: usize,
    pub total_batches: usize,
    pub success_rate: f64,
    pub elapsed_seconds: f64,
    pub verdict: RunVerdict,
    pub aborted: Option<AbortReason>,
    pub plan: BatchPlan,
    pub failed_batches: Vec<FailedBatch>,
}

/// Collects settled batches; owned by the dispatching task only.
pub(crate) struct Aggregator {
    ids: Vec<ChunkId>,
    slots: Vec<Option<Vec<f32>>>,
    failed: Vec<FailedBatch>,
    attempts: Vec<u32>,
    settled_batches: usize,
    settled_chunks: usize,
    succeeded_chunks: usize,
}

impl Aggregator {
    pub(crate) fn new(ids: Vec<ChunkId>, total_batches: usize) -> Self {
        let slots = vec![None; ids.len()];
        Self {
            ids,
            slots,
            failed: Vec::new(),
            attempts: vec![0; total_batches],
            settled_batches: 0,
            settled_chunks: 0,
            succeeded_chunks: 0,
        }
    }

    pub(crate) fn record(&mut self, batch: &Batch, outcome: BatchOutcome) {
        if let Some(slot) = self.attempts.get_mut(batch.index) {
            *slot = outcome.attempts_made();
        }
        self.settled_batches += 1;
        self.settled_chunks += batch.len();
        match outcome {
            BatchOutcome::Success { vectors, .. } => {
                self.succeeded_chunks += vectors.len();
                for (i, vector) in vectors.into_iter().enumerate() {
                    self.slots[batch.offset + i] = Some(vector);
                }
            }
            BatchOutcome::Failure { kind, attempts_made, last_error } => self.failed.push(FailedBatch {
                batch_index: batch.index,
                chunk_ids: batch.chunk_ids(),
                kind,
                attempts_made,
                last_error,
            }),
        }
    }

    pub(crate) fn not_attempted(&mut self, batch: &Batch, reason: AbortReason) {
        self.failed.push(FailedBatch {
            batch_index: batch.index,
            chunk_ids: batch.chunk_ids(),
            kind: FailureKind::NotAttempted(reason),
            attempts_made: 0,
            last_error: format!("not dispatched: {}", reason),
        });
    }

    pub(crate) fn settled_batches(&self) -> usize {
        self.settled_batches
    }

    pub(crate) fn settled_chunks(&self) -> usize {
        self.settled_chunks
    }

    /// Successful share of the chunks settled so far.
    pub(crate) fn running_success_rate(&self) -> f64 {
        if self.settled_chunks == 0 {
            1.0
        } else {
            self.succeeded_chunks as f64 / self.settled_chunks as f64
        }
    }

    pub(crate) fn finish(
        mut self,
        plan: BatchPlan,
        elapsed_seconds: f64,
        aborted: Option<AbortReason>,
        failure_threshold: f64,
    ) -> RunResult {
        let total_chunks = self.ids.len();
        let vectors: Vec<EmbeddedChunk> = self
            .slots
            .into_iter()
            .enumerate()
            .filter_map(|(position, slot)| slot.map(|vector| EmbeddedChunk { id: self.ids[position], position, vector }))
            .collect();
        let success_rate = if total_chunks == 0 { 1.0 } else { vectors.len() as f64 / total_chunks as f64 };
        self.failed.sort_by_key(|b| b.batch_index);
        RunResult {
            vectors,
            failed_batches: self.failed,
            success_rate,
            elapsed_seconds,
            total_chunks,
            total_batches: plan.total_batches,
            plan,
            batch_attempts: self.attempts,
            aborted,
            failure_threshold,
        }
    }
}
