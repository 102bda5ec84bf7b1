use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bulkpipe::error::{Error, Result};
use bulkpipe::pipeline::retry::RetryPolicy;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn waits_one_then_two_seconds_before_succeeding() -> Result<()> {
    let started = Instant::now();
    let seen = Arc::new(Mutex::new(Vec::<(u32, Duration)>::new()));
    let seen_in_op = seen.clone();

    let attempted = RetryPolicy::default()
        .run(move |attempt| {
            let seen = seen_in_op.clone();
            async move {
                seen.lock()
                    .expect("mutex poisoned")
                    .push((attempt, started.elapsed()));
                if attempt < 3 {
                    Err(Error::remote("503 service unavailable"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await?;

    assert_eq!(attempted.value, "ok");
    assert_eq!(attempted.attempts, 3);
    assert!(attempted.last_error.is_some());
    assert_eq!(
        *seen.lock().expect("mutex poisoned"),
        vec![
            (1, Duration::ZERO),
            (2, Duration::from_secs(1)),
            (3, Duration::from_secs(3)),
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn tenth_failure_is_fatal_and_there_is_no_eleventh_attempt() {
    let started = Instant::now();
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_in_op = attempts.clone();

    let err = RetryPolicy::default()
        .run(move |_| {
            let attempts = attempts_in_op.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::remote("connection refused"))
            }
        })
        .await
        .unwrap_err();

    assert_eq!(attempts.load(Ordering::SeqCst), 10);
    match err {
        Error::RetryExhausted { attempts, source } => {
            assert_eq!(attempts, 10);
            assert!(source.to_string().contains("connection refused"));
        }
        other => panic!("unexpected error: {other}"),
    }
    // 1 + 2 + 4 + 8 + 5 * 10
    assert_eq!(started.elapsed(), Duration::from_secs(65));
}

#[tokio::test(start_paused = true)]
async fn first_success_does_not_wait() -> Result<()> {
    let started = Instant::now();
    let attempted = RetryPolicy::default().run(|_| async { Ok(7) }).await?;
    assert_eq!(attempted.value, 7);
    assert_eq!(attempted.attempts, 1);
    assert!(attempted.last_error.is_none());
    assert_eq!(started.elapsed(), Duration::ZERO);
    Ok(())
}

#[test]
fn schedule_doubles_and_caps() {
    let waits: Vec<u64> = RetryPolicy::default()
        .schedule()
        .map(|d| d.as_secs())
        .collect();
    assert_eq!(waits, vec![1, 2, 4, 8, 10, 10, 10, 10, 10]);
}
