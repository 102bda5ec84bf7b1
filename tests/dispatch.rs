use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bulkpipe::chunk::{chunk_operations, Chunk, ChunkLimits};
use bulkpipe::dispatch::{DispatchResult, DispatchStatus, Dispatcher};
use bulkpipe::error::{Error, Result};
use bulkpipe::pipeline::chain::PipeExt;
use bulkpipe::pipeline::retry::RetryPolicy;
use bulkpipe::pipeline::runtime::Runtime;

mod common;
use common::{Outcome, RecordingSink, VecSource};

fn chunks(docs: usize, per_chunk: usize) -> Vec<Chunk> {
    let limits = ChunkLimits::unbounded_bytes(per_chunk).expect("limits");
    chunk_operations(common::ops(docs), limits).collect()
}

async fn dispatch(
    sink: RecordingSink,
    chunks: Vec<Chunk>,
    parallelism: usize,
    retry: RetryPolicy,
) -> (Vec<DispatchResult>, Result<()>) {
    let dispatcher = Dispatcher::new(Arc::new(sink))
        .parallelism(parallelism)
        .with_retry(retry);
    let pipe = VecSource::new(chunks).pipe(dispatcher);

    let runtime = Runtime::new().buffer(4).buffer_stage("dispatcher", parallelism);
    let (tx, mut rx, _cancel, handle) = runtime.spawn(pipe);
    tx.send(()).await.expect("start send failed");
    drop(tx);

    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }
    let outcome = handle.await.expect("join failed");
    (results, outcome)
}

#[tokio::test(start_paused = true)]
async fn never_more_than_parallelism_chunks_in_flight() {
    let sink = RecordingSink::new().latency(Duration::from_millis(100));
    let (results, outcome) = dispatch(sink.clone(), chunks(200, 10), 3, RetryPolicy::default()).await;

    outcome.expect("dispatch failed");
    assert_eq!(results.len(), 20);
    assert!(results.iter().all(DispatchResult::is_delivered));
    assert_eq!(sink.max_in_flight(), 3);
    assert!(sink.connects() <= 3, "connects: {}", sink.connects());

    let accepted: BTreeSet<u64> = sink.accepted().into_iter().collect();
    assert_eq!(accepted, (0..20).collect());
}

#[tokio::test]
async fn single_worker_delivers_in_source_order_over_one_connection() {
    let sink = RecordingSink::new();
    let (results, outcome) = dispatch(sink.clone(), chunks(95, 10), 1, RetryPolicy::default()).await;

    outcome.expect("dispatch failed");
    assert_eq!(results.len(), 10);
    assert_eq!(sink.accepted(), (0..10).collect::<Vec<_>>());
    assert_eq!(sink.documents(), (0..95).collect::<Vec<_>>());
    assert_eq!(sink.max_in_flight(), 1);
    assert_eq!(sink.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_and_reported() {
    let sink = RecordingSink::new().script([Outcome::Reject, Outcome::Reject]);
    let (results, outcome) = dispatch(sink.clone(), chunks(3, 10), 1, RetryPolicy::default()).await;

    outcome.expect("dispatch failed");
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.status, DispatchStatus::Delivered);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.docs, 3);
    assert!(result
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("rejected")));
    assert_eq!(sink.attempts(), vec![0, 0, 0]);
    assert_eq!(sink.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_chunk_stops_admission_and_drains_in_flight() {
    let sink = RecordingSink::new()
        .latency(Duration::from_millis(100))
        .fail_chunk(2);
    let retry = RetryPolicy::new(2).base_delay(Duration::from_millis(10));
    let (results, outcome) = dispatch(sink.clone(), chunks(500, 10), 2, retry).await;

    match outcome.unwrap_err() {
        Error::Dispatch { chunk, source } => {
            assert_eq!(chunk, 2);
            assert!(matches!(*source, Error::RetryExhausted { attempts: 2, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }

    let failed: Vec<&DispatchResult> = results.iter().filter(|r| !r.is_delivered()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].ordinal, 2);
    assert_eq!(failed[0].attempts, 2);

    // Far fewer than the 50 chunks were started.
    let attempted: BTreeSet<u64> = sink.attempts().into_iter().collect();
    assert!(attempted.len() < 10, "attempted: {attempted:?}");

    // Every started chunk other than the failed one ran to completion.
    let accepted: BTreeSet<u64> = sink.accepted().into_iter().collect();
    let mut expected = attempted.clone();
    expected.remove(&2);
    assert_eq!(accepted, expected);
    assert_eq!(results.len(), attempted.len());
}

#[tokio::test(start_paused = true)]
async fn refused_connection_is_retried_with_backoff() {
    let sink = RecordingSink::new().refuse_connects(2);
    let (results, outcome) = dispatch(sink.clone(), chunks(25, 10), 1, RetryPolicy::default()).await;

    outcome.expect("dispatch failed");
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].attempts, 3);
    assert!(results[0]
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("connection refused")));
    assert!(results[1..].iter().all(|r| r.attempts == 1));
    assert_eq!(sink.connects(), 1);
    assert_eq!(sink.accepted(), vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn connection_that_never_comes_up_fails_the_chunk() {
    let sink = RecordingSink::new().refuse_connects(usize::MAX);
    let retry = RetryPolicy::new(3).base_delay(Duration::from_millis(10));
    let (results, outcome) = dispatch(sink.clone(), chunks(25, 10), 1, retry).await;

    assert!(matches!(outcome.unwrap_err(), Error::Dispatch { chunk: 0, .. }));
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, DispatchStatus::Failed);
    assert_eq!(results[0].attempts, 3);
    assert!(sink.attempts().is_empty());
}

#[tokio::test]
async fn no_chunks_means_no_connections() {
    let sink = RecordingSink::new();
    let (results, outcome) = dispatch(sink.clone(), Vec::new(), 4, RetryPolicy::default()).await;

    outcome.expect("dispatch failed");
    assert!(results.is_empty());
    assert_eq!(sink.connects(), 0);
}
