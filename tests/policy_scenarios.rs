//! End-to-end policy behaviour through the public executor API.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use futures_util::future::join_all;

use resilience_engine::config::{BackoffConfig, PolicyConfig};
use resilience_engine::resilience::{
    CircuitState, PolicyError, PolicyExecutor, PolicyRegistry, Retryable, SystemClock,
};

#[derive(Debug, Clone, PartialEq)]
enum CallError {
    Timeout,
    BadRequest,
}

impl Retryable for CallError {
    fn is_retryable(&self) -> bool {
        matches!(self, CallError::Timeout)
    }
}

fn executor(configure: impl FnOnce(&mut PolicyConfig)) -> PolicyExecutor {
    let mut policy = PolicyConfig::default();
    configure(&mut policy);
    PolicyExecutor::new(Arc::new(PolicyRegistry::new(policy, Arc::new(SystemClock))))
}

#[tokio::test(start_paused = true)]
async fn test_fixed_window_admits_limit_then_resets() {
    let exec = executor(|p| {
        p.rate_limit.permit_limit = 10;
        p.rate_limit.window_secs = 60;
    });

    for _ in 0..10 {
        let r: Result<u8, PolicyError<CallError>> = exec.run("posts", "alice", || async { Ok(1) }).await;
        assert_eq!(r, Ok(1));
    }
    let rejected: Result<u8, PolicyError<CallError>> = exec.run("posts", "alice", || async { Ok(1) }).await;
    match rejected {
        Err(PolicyError::RateLimitExceeded { partition, retry_after }) => {
            assert_eq!(partition, "alice");
            assert_eq!(retry_after, Duration::from_secs(60));
        }
        other => panic!("expected rate limit rejection, got {other:?}"),
    }

    tokio::time::advance(Duration::from_secs(60)).await;
    let r: Result<u8, PolicyError<CallError>> = exec.run("posts", "alice", || async { Ok(1) }).await;
    assert_eq!(r, Ok(1));
}

#[tokio::test(start_paused = true)]
async fn test_breaker_opens_then_recovers_after_trial() {
    let exec = executor(|p| {
        p.retry.max_attempts = 1;
        p.circuit_breaker.failure_threshold = 3;
        p.circuit_breaker.break_duration_secs = 30;
        p.rate_limit.permit_limit = 100;
    });
    let calls = AtomicU32::new(0);
    let calls = &calls;

    for _ in 0..3 {
        let r: Result<(), _> = exec
            .run("users", "alice", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CallError::Timeout)
            })
            .await;
        assert!(matches!(r, Err(PolicyError::RetryExhausted { attempts: 1, .. })));
    }
    let breaker = exec.registry().breaker("users");
    assert_eq!(breaker.state(), CircuitState::Open);

    let rejected: Result<(), _> = exec.run("users", "alice", || async { Ok::<_, CallError>(()) }).await;
    assert_eq!(rejected, Err(PolicyError::CircuitOpen { target: "users".into() }));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    tokio::time::advance(Duration::from_secs(30)).await;
    let trial: Result<&str, PolicyError<CallError>> = exec.run("users", "alice", || async { Ok("fine") }).await;
    assert_eq!(trial, Ok("fine"));
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.consecutive_failures(), 0);

    let next = exec
        .run("users", "alice", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CallError>("normal")
        })
        .await;
    assert_eq!(next, Ok("normal"));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_retry_succeeds_on_fourth_attempt() {
    let exec = executor(|p| {
        p.retry.max_attempts = 4;
        p.retry.backoff = BackoffConfig::Fixed { delay_ms: 1000 };
        p.circuit_breaker.failure_threshold = 10;
    });
    let calls = AtomicU32::new(0);
    let calls = &calls;
    let start = tokio::time::Instant::now();

    let result = exec
        .run("users", "alice", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(CallError::Timeout)
            } else {
                Ok("done")
            }
        })
        .await;

    assert_eq!(result, Ok("done"));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(start.elapsed(), Duration::from_secs(3));
    assert_eq!(exec.registry().breaker("users").consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_not_retried() {
    let exec = executor(|_| {});
    let calls = AtomicU32::new(0);
    let calls = &calls;

    let result: Result<(), _> = exec
        .run("users", "alice", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CallError::BadRequest)
        })
        .await;

    assert_eq!(result, Err(PolicyError::Permanent(CallError::BadRequest)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_never_exceed_permit_limit() {
    let exec = executor(|p| {
        p.rate_limit.permit_limit = 10;
    });

    let calls = (0..50).map(|_| exec.run("posts", "alice", || async { Ok::<_, CallError>(()) }));
    let results = join_all(calls).await;

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let limited = results
        .iter()
        .filter(|r| matches!(r, Err(PolicyError::RateLimitExceeded { .. })))
        .count();
    assert_eq!(admitted, 10);
    assert_eq!(limited, 40);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_admits_a_single_concurrent_trial() {
    let exec = executor(|p| {
        p.retry.max_attempts = 1;
        p.circuit_breaker.failure_threshold = 1;
        p.circuit_breaker.break_duration_secs = 30;
        p.rate_limit.permit_limit = 100;
    });
    let _: Result<(), _> = exec.run("users", "alice", || async { Err(CallError::Timeout) }).await;
    tokio::time::advance(Duration::from_secs(30)).await;

    let invoked = AtomicU32::new(0);
    let invoked = &invoked;
    let exec = &exec;
    let calls = (0..5).map(|_| async move {
        exec.run("users", "alice", || async move {
            invoked.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, CallError>(())
        })
        .await
    });
    let results = join_all(calls).await;

    assert_eq!(invoked.load(Ordering::SeqCst), 1);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(PolicyError::CircuitOpen { .. })))
            .count(),
        4
    );
    assert_eq!(exec.registry().breaker("users").state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_partitions_and_targets_are_isolated() {
    let exec = executor(|p| {
        p.retry.max_attempts = 1;
        p.circuit_breaker.failure_threshold = 1;
        p.rate_limit.permit_limit = 1;
    });

    let _: Result<(), _> = exec.run("users", "alice", || async { Err(CallError::Timeout) }).await;

    let bob: Result<(), PolicyError<CallError>> = exec.run("posts", "bob", || async { Ok(()) }).await;
    assert_eq!(bob, Ok(()));
    let alice_other_target: Result<(), PolicyError<CallError>> =
        exec.run("posts", "alice", || async { Ok(()) }).await;
    assert_eq!(alice_other_target, Ok(()));
    assert_eq!(exec.registry().breaker("users").state(), CircuitState::Open);
    assert_eq!(exec.registry().breaker("posts").state(), CircuitState::Closed);
}
