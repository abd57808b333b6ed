//! Batch embedding pipeline.
//!
//! [`plan`] sizes the run from the embedder's [`EmbedderProfile`](ragbatch_core::EmbedderProfile),
//! [`BatchScheduler`] executes it with bounded concurrency and per-batch retry,
//! and the result comes back as a [`RunResult`] that never hides partial failure.

pub mod batch;
pub mod outcome;
pub mod planner;
pub mod progress;
pub mod retry;
pub mod scheduler;

pub use batch::{partition, Batch};
pub use outcome::{AbortReason, BatchOutcome, FailedBatch, FailureKind, RunReport, RunResult, RunVerdict};
pub use planner::{plan, BatchPlan};
pub use progress::{
    ChannelProgress, CollectingProgress, LogProgress, NoProgress, ProgressEvent, ProgressPhase, ProgressSink,
};
pub use retry::{AttemptState, AttemptTracker, RetryPolicy};
pub use scheduler::{run, BatchScheduler, PipelineError, RunOptions};
