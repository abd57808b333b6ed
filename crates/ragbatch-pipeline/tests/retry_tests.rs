use std::time::Duration;

use ragbatch_core::config::PipelineSettings;
use ragbatch_core::ErrorClass;
use ragbatch_pipeline::{AttemptState, AttemptTracker, RetryPolicy};

fn policy(base_ms: u64, jitter_ms: u64) -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(base_ms),
        max_jitter: Duration::from_millis(jitter_ms),
    }
}

#[test]
fn defaults_match_pipeline_settings() {
    let from_settings = RetryPolicy::from_settings(&PipelineSettings::default());
    assert_eq!(from_settings, RetryPolicy::default());
    assert_eq!(from_settings.max_attempts, 3);
    assert_eq!(from_settings.base_delay, Duration::from_secs(1));
}

#[test]
fn backoff_doubles_per_attempt() {
    let p = policy(1000, 0);
    assert_eq!(p.backoff(1), Duration::from_secs(1));
    assert_eq!(p.backoff(2), Duration::from_secs(2));
    assert_eq!(p.backoff(3), Duration::from_secs(4));
}

#[test]
fn jitter_stays_within_bounds() {
    let p = policy(10, 50);
    for _ in 0..200 {
        assert!(p.jitter() <= Duration::from_millis(50));
    }
    assert_eq!(policy(10, 0).jitter(), Duration::ZERO);
}

#[test]
fn retryable_errors_stop_after_three_attempts() {
    let mut tracker = AttemptTracker::new(policy(100, 20));
    assert_eq!(tracker.state(), AttemptState::Pending);
    let mut delays = Vec::new();
    loop {
        let attempt = tracker.begin();
        assert_eq!(tracker.state(), AttemptState::Attempting { attempt });
        match tracker.fail(ErrorClass::Retryable, None) {
            Some(delay) => {
                assert_eq!(tracker.state(), AttemptState::RetryScheduled { attempt, delay });
                delays.push(delay);
            }
            None => break,
        }
    }
    assert_eq!(tracker.attempts(), 3);
    assert_eq!(tracker.state(), AttemptState::Failed { attempts: 3, class: ErrorClass::Retryable });
    assert_eq!(delays.len(), 2);
    assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{delays:?}");
    assert!(delays[0] >= Duration::from_millis(100) && delays[0] <= Duration::from_millis(120));
    assert!(delays[1] >= Duration::from_millis(200) && delays[1] <= Duration::from_millis(220));
}

#[test]
fn delays_never_decrease_even_with_large_jitter() {
    // Jitter larger than the base could otherwise shrink the second delay.
    for _ in 0..100 {
        let mut tracker = AttemptTracker::new(RetryPolicy { max_attempts: 5, ..policy(1, 500) });
        let mut last = Duration::ZERO;
        loop {
            tracker.begin();
            match tracker.fail(ErrorClass::Retryable, None) {
                Some(delay) => {
                    assert!(delay >= last);
                    last = delay;
                }
                None => break,
            }
        }
    }
}

#[test]
fn retry_after_hint_raises_the_delay() {
    let mut tracker = AttemptTracker::new(policy(100, 0));
    tracker.begin();
    assert_eq!(tracker.fail(ErrorClass::Retryable, Some(Duration::from_secs(5))), Some(Duration::from_secs(5)));
    tracker.begin();
    // Backoff (200ms) is below the previous delay, so the delay holds at 5s.
    assert_eq!(tracker.fail(ErrorClass::Retryable, None), Some(Duration::from_secs(5)));
}

#[test]
fn non_retryable_classes_fail_immediately() {
    for class in [ErrorClass::RequestFatal, ErrorClass::AuthFatal, ErrorClass::RateLimited] {
        let mut tracker = AttemptTracker::new(policy(100, 0));
        tracker.begin();
        assert_eq!(tracker.fail(class, None), None);
        assert_eq!(tracker.state(), AttemptState::Failed { attempts: 1, class });
    }
}

#[test]
fn success_after_retries_reports_attempts() {
    let mut tracker = AttemptTracker::new(policy(1, 0));
    tracker.begin();
    tracker.fail(ErrorClass::Retryable, None);
    tracker.begin();
    tracker.fail(ErrorClass::Retryable, None);
    tracker.begin();
    tracker.succeed();
    assert_eq!(tracker.state(), AttemptState::Succeeded { attempts: 3 });
}
