//! Runs one ingestion: plan, partition, dispatch under a concurrency limit,
//! retry, aggregate.
//!
//! Batches are dispatched in index order through a counting semaphore and
//! complete in any order. The dispatching task is the only owner of the
//! aggregator; batch tasks report back through the `JoinSet`. A batch that
//! hits a run-aborting error sets the shared abort flag before releasing its
//! permit, so no later batch can start after it.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ragbatch_core::config::PipelineSettings;
use ragbatch_core::redact::sanitize_message;
use ragbatch_core::{Chunk, EmbedError, EmbedderCapability, EmbedderProfile};

use crate::batch::{partition, Batch};
use crate::outcome::{AbortReason, Aggregator, BatchOutcome, FailureKind, RunResult};
use crate::planner::{plan, BatchPlan};
use crate::progress::{completion_message, ProgressEvent, ProgressPhase, ProgressSink};
use crate::retry::{AttemptTracker, RetryPolicy};

pub const DEFAULT_FAILURE_THRESHOLD: f64 = 0.5;

/// Hard failures of a run; per-batch failures are reported in [`RunResult`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Embedder is not ready: {0}")]
    Setup(#[source] EmbedError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub retry: RetryPolicy,
    /// Stops dispatch when cancelled; in-flight batches still finish.
    pub cancel: Option<CancellationToken>,
    /// Below this success rate the run's verdict is `Failed`.
    pub failure_threshold: f64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { retry: RetryPolicy::default(), cancel: None, failure_threshold: DEFAULT_FAILURE_THRESHOLD }
    }
}

impl RunOptions {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            retry: RetryPolicy::from_settings(settings),
            cancel: None,
            failure_threshold: settings.failure_threshold,
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchScheduler {
    options: RunOptions,
}

/// Embed `chunks` with default options.
pub async fn run<P>(
    chunks: &[Chunk],
    embedder: Arc<dyn EmbedderCapability>,
    profile: &EmbedderProfile,
    on_progress: &P,
) -> Result<RunResult, PipelineError>
where
    P: ProgressSink + ?Sized,
{
    BatchScheduler::default().run(chunks, embedder, profile, on_progress).await
}

impl BatchScheduler {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub async fn run<P>(
        &self,
        chunks: &[Chunk],
        embedder: Arc<dyn EmbedderCapability>,
        profile: &EmbedderProfile,
        on_progress: &P,
    ) -> Result<RunResult, PipelineError>
    where
        P: ProgressSink + ?Sized,
    {
        reject_duplicate_ids(chunks)?;
        let started = Instant::now();
        let plan = plan(chunks.len(), profile);
        let mut aggregator = Aggregator::new(chunks.iter().map(|c| c.id).collect(), plan.total_batches);

        if !chunks.is_empty() {
            embedder.check_ready().await.map_err(|e| {
                error!(embedder = embedder.name(), error = %sanitize_message(&e.to_string()), "embedder setup failed");
                PipelineError::Setup(e)
            })?;
        }

        info!(
            embedder = embedder.name(),
            chunks = chunks.len(),
            batch_size = plan.batch_size,
            concurrency = plan.concurrency,
            total_batches = plan.total_batches,
            "starting embedding run"
        );
        on_progress.emit(ProgressEvent {
            phase: ProgressPhase::Starting,
            current_batch: 0,
            total_batches: plan.total_batches,
            chunks_completed: 0,
            chunks_total: chunks.len(),
            elapsed_seconds: 0.0,
            success_rate_so_far: 1.0,
            message: format!(
                "Embedding {} chunks in {} batches of up to {} ({} concurrent)",
                chunks.len(),
                plan.total_batches,
                plan.batch_size,
                plan.concurrency
            ),
        });

        let batches = partition(chunks, plan.batch_size);
        let aborted = self.dispatch(batches, embedder, profile, plan, &mut aggregator, on_progress, started).await;

        let result = aggregator.finish(plan, started.elapsed().as_secs_f64(), aborted, self.options.failure_threshold);
        let message = completion_message(
            result.settled_chunks(),
            result.total_chunks,
            result.elapsed_seconds,
            result.success_rate,
        );
        info!(
            succeeded = result.succeeded_chunks(),
            failed = result.failed_chunks(),
            failed_batches = result.failed_batches.len(),
            verdict = ?result.verdict(),
            "{}",
            message
        );
        on_progress.emit(ProgressEvent {
            phase: ProgressPhase::Done,
            current_batch: result.settled_batches(),
            total_batches: result.total_batches,
            chunks_completed: result.settled_chunks(),
            chunks_total: result.total_chunks,
            elapsed_seconds: result.elapsed_seconds,
            success_rate_so_far: result.success_rate,
            message,
        });
        Ok(result)
    }

    /// Dispatch every batch, settle every task. Returns why dispatch stopped early, if it did.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch<P>(
        &self,
        batches: Vec<Batch>,
        embedder: Arc<dyn EmbedderCapability>,
        profile: &EmbedderProfile,
        plan: BatchPlan,
        aggregator: &mut Aggregator,
        on_progress: &P,
        started: Instant,
    ) -> Option<AbortReason>
    where
        P: ProgressSink + ?Sized,
    {
        let semaphore = Arc::new(Semaphore::new(plan.concurrency));
        let abort: Arc<OnceLock<AbortReason>> = Arc::new(OnceLock::new());
        let cancel = self.options.cancel.clone().unwrap_or_default();
        let profile = Arc::new(profile.clone());
        let chunks_total: usize = batches.iter().map(Batch::len).sum();

        let mut tasks: JoinSet<(usize, BatchOutcome)> = JoinSet::new();
        let mut in_flight: BTreeMap<usize, Batch> = BTreeMap::new();
        let mut queue = batches.into_iter();
        let mut stopped: Option<AbortReason> = None;

        let settle = |aggregator: &mut Aggregator, batch: Batch, outcome: BatchOutcome| {
            let failure = match &outcome {
                BatchOutcome::Failure { kind, attempts_made, last_error } => format!(
                    "Batch {}/{} failed ({}) after {} attempt(s): {}. ",
                    batch.index + 1,
                    plan.total_batches,
                    kind,
                    attempts_made,
                    last_error
                ),
                BatchOutcome::Success { .. } => String::new(),
            };
            aggregator.record(&batch, outcome);
            let elapsed = started.elapsed().as_secs_f64();
            let rate = aggregator.running_success_rate();
            let done = completion_message(aggregator.settled_chunks(), chunks_total, elapsed, rate);
            on_progress.emit(ProgressEvent {
                phase: ProgressPhase::InProgress,
                current_batch: aggregator.settled_batches(),
                total_batches: plan.total_batches,
                chunks_completed: aggregator.settled_chunks(),
                chunks_total,
                elapsed_seconds: elapsed,
                success_rate_so_far: rate,
                message: format!("{}{}", failure, done),
            });
        };

        'dispatch: for batch in queue.by_ref() {
            let permit = loop {
                if let Some(reason) = stop_reason(&abort, &cancel) {
                    stopped = Some(reason);
                    aggregator.not_attempted(&batch, reason);
                    break 'dispatch;
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => continue,
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                        Ok((index, outcome)) => {
                            if let Some(done) = in_flight.remove(&index) {
                                settle(aggregator, done, outcome);
                            }
                        }
                        Err(e) => error!(error = %e, "batch task ended abnormally"),
                    },
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => break permit,
                        Err(_) => {
                            // The semaphore is never closed while dispatching.
                            stopped = Some(AbortReason::Cancelled);
                            aggregator.not_attempted(&batch, AbortReason::Cancelled);
                            break 'dispatch;
                        }
                    },
                }
            };
            // A batch may have aborted the run while this one waited for the permit.
            if let Some(reason) = stop_reason(&abort, &cancel) {
                stopped = Some(reason);
                aggregator.not_attempted(&batch, reason);
                drop(permit);
                break;
            }
            debug!(batch = batch.index + 1, size = batch.len(), "dispatching batch");
            let job = BatchJob {
                index: batch.index,
                texts: batch.texts(),
                embedder: embedder.clone(),
                profile: profile.clone(),
                policy: self.options.retry,
                abort: abort.clone(),
                total_batches: plan.total_batches,
            };
            in_flight.insert(batch.index, batch);
            tasks.spawn(job.execute(permit));
        }

        if let Some(reason) = stopped {
            let remaining: Vec<Batch> = queue.collect();
            warn!(reason = %reason, not_attempted = remaining.len() + 1, "stopped dispatching batches");
            for batch in &remaining {
                aggregator.not_attempted(batch, reason);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    if let Some(done) = in_flight.remove(&index) {
                        settle(aggregator, done, outcome);
                    }
                }
                Err(e) => error!(error = %e, "batch task ended abnormally"),
            }
        }
        for (_, batch) in std::mem::take(&mut in_flight) {
            let outcome = BatchOutcome::Failure {
                kind: FailureKind::RequestFatal,
                attempts_made: 0,
                last_error: "batch task ended before reporting an outcome".to_string(),
            };
            settle(aggregator, batch, outcome);
        }

        // An abort raised by the last in-flight batch still counts.
        stopped.or_else(|| abort.get().copied())
    }
}

fn stop_reason(abort: &OnceLock<AbortReason>, cancel: &CancellationToken) -> Option<AbortReason> {
    abort.get().copied().or_else(|| cancel.is_cancelled().then_some(AbortReason::Cancelled))
}

fn reject_duplicate_ids(chunks: &[Chunk]) -> Result<(), PipelineError> {
    let mut seen = HashSet::with_capacity(chunks.len());
    for chunk in chunks {
        if !seen.insert(chunk.id) {
            return Err(PipelineError::InvalidInput(format!("duplicate chunk id {}", chunk.id)));
        }
    }
    Ok(())
}

/// Everything one batch task owns.
struct BatchJob {
    index: usize,
    texts: Vec<String>,
    embedder: Arc<dyn EmbedderCapability>,
    profile: Arc<EmbedderProfile>,
    policy: RetryPolicy,
    abort: Arc<OnceLock<AbortReason>>,
    total_batches: usize,
}

impl BatchJob {
    /// Attempt the batch until it succeeds or fails for good. Holds `permit` throughout.
    async fn execute(self, permit: OwnedSemaphorePermit) -> (usize, BatchOutcome) {
        let outcome = self.attempt_until_settled().await;
        drop(permit);
        (self.index, outcome)
    }

    async fn attempt_until_settled(&self) -> BatchOutcome {
        let batch_no = self.index + 1;
        let expected = self.texts.len();
        let limit = self.profile.attempt_timeout(expected);
        let mut tracker = AttemptTracker::new(self.policy);
        loop {
            let attempt = tracker.begin();
            let err = match timeout(limit, self.embedder.embed(&self.texts)).await {
                Ok(Ok(vectors)) if vectors.len() == expected => {
                    tracker.succeed();
                    debug!(batch = batch_no, attempt, "batch embedded");
                    return BatchOutcome::Success { vectors, attempts_made: attempt };
                }
                Ok(Ok(vectors)) => {
                    let message = format!("embedder returned {} vectors for {} chunks", vectors.len(), expected);
                    error!(batch = batch_no, attempt, "{}", message);
                    return BatchOutcome::Failure { kind: FailureKind::RequestFatal, attempts_made: attempt, last_error: message };
                }
                Ok(Err(e)) => e,
                Err(_) => EmbedError::timeout(limit),
            };

            let class = self.profile.classify(&err);
            let reason = sanitize_message(&err.to_string());
            if let Some(abort) = AbortReason::from_class(class) {
                // First abort wins; later ones are reported on their own batch only.
                let _ = self.abort.set(abort);
                error!(batch = batch_no, total = self.total_batches, attempt, class = %class, error = %reason, "batch failed; aborting run");
                tracker.fail(class, None);
                return BatchOutcome::Failure { kind: FailureKind::from_class(class), attempts_made: attempt, last_error: reason };
            }

            let hint = if self.profile.supports_retry_after { err.retry_after } else { None };
            match tracker.fail(class, hint) {
                Some(delay) => {
                    warn!(
                        batch = batch_no,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        class = %class,
                        error = %reason,
                        "batch attempt failed; retrying"
                    );
                    sleep(delay).await;
                }
                None => {
                    error!(batch = batch_no, attempt, class = %class, error = %reason, "batch failed");
                    return BatchOutcome::Failure { kind: FailureKind::from_class(class), attempts_made: attempt, last_error: reason };
                }
            }
        }
    }
}
