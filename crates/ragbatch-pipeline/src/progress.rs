//! Progress events and the sinks that receive them.
//!
//! The scheduler emits `Starting` once, `InProgress` after each batch settles
//! and `Done` once at the end. Sinks must return quickly.

use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgressPhase {
    Starting,
    InProgress,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    /// Batches settled so far.
    pub current_batch: usize,
    pub total_batches: usize,
    /// Chunks whose batch has settled, successfully or not.
    pub chunks_completed: usize,
    pub chunks_total: usize,
    pub elapsed_seconds: f64,
    pub success_rate_so_far: f64,
    pub message: String,
}

/// "Completed 150/200 chunks in 45.2s (success rate: 95.0%)"
pub fn completion_message(completed: usize, total: usize, elapsed_seconds: f64, success_rate: f64) -> String {
    format!(
        "Completed {}/{} chunks in {:.1}s (success rate: {:.1}%)",
        completed,
        total,
        elapsed_seconds,
        success_rate * 100.0
    )
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Forwards events to an unbounded channel; a dropped receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ProgressSink for CollectingProgress {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}

/// Writes each event as a structured `info` line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn emit(&self, event: ProgressEvent) {
        info!(
            phase = ?event.phase,
            batch = event.current_batch,
            total_batches = event.total_batches,
            chunks = event.chunks_completed,
            "{}",
            event.message
        );
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}
