use std::io;
use std::sync::{Arc, Mutex};

use ragbatch_pipeline::progress::completion_message;
use ragbatch_pipeline::{ChannelProgress, CollectingProgress, LogProgress, ProgressEvent, ProgressPhase, ProgressSink};

fn event(phase: ProgressPhase, current_batch: usize) -> ProgressEvent {
    ProgressEvent {
        phase,
        current_batch,
        total_batches: 4,
        chunks_completed: current_batch * 50,
        chunks_total: 200,
        elapsed_seconds: 1.0,
        success_rate_so_far: 1.0,
        message: String::new(),
    }
}

#[test]
fn completion_message_format() {
    assert_eq!(
        completion_message(150, 200, 45.23, 0.95),
        "Completed 150/200 chunks in 45.2s (success rate: 95.0%)"
    );
}

#[tokio::test]
async fn channel_sink_forwards_in_order() {
    let (sink, mut rx) = ChannelProgress::new();
    sink.emit(event(ProgressPhase::Starting, 0));
    sink.emit(event(ProgressPhase::InProgress, 1));
    sink.emit(event(ProgressPhase::Done, 4));
    drop(sink);

    let mut phases = Vec::new();
    while let Some(e) = rx.recv().await {
        phases.push(e.phase);
    }
    assert_eq!(phases, vec![ProgressPhase::Starting, ProgressPhase::InProgress, ProgressPhase::Done]);
}

#[test]
fn channel_sink_ignores_a_dropped_receiver() {
    let (sink, rx) = ChannelProgress::new();
    drop(rx);
    sink.emit(event(ProgressPhase::Done, 4));
}

#[test]
fn collecting_sink_and_closures() {
    let collected = CollectingProgress::new();
    collected.emit(event(ProgressPhase::InProgress, 2));
    assert_eq!(collected.events(), vec![event(ProgressPhase::InProgress, 2)]);

    let seen = std::sync::Mutex::new(0usize);
    let counter = |e: ProgressEvent| *seen.lock().unwrap() += e.current_batch;
    counter.emit(event(ProgressPhase::InProgress, 3));
    assert_eq!(*seen.lock().unwrap(), 3);
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn log_sink_writes_one_line_per_event() {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_target(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let mut started = event(ProgressPhase::Starting, 0);
        started.message = "Embedding 200 chunks in 4 batches".to_string();
        LogProgress.emit(started);
        let mut done = event(ProgressPhase::Done, 4);
        done.message = completion_message(200, 200, 3.0, 1.0);
        LogProgress.emit(done);
    });

    let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2, "{out}");
    assert!(lines[0].contains("INFO"), "{out}");
    assert!(lines[0].contains("Embedding 200 chunks in 4 batches"), "{out}");
    assert!(lines[0].contains("phase=Starting"), "{out}");
    assert!(lines[1].contains("Completed 200/200 chunks in 3.0s"), "{out}");
    assert!(lines[1].contains("chunks=200"), "{out}");
    assert!(lines[1].contains("total_batches=4"), "{out}");
}
