use dashboard_sync::{
    run_all, run_safe, run_with_deadline, AggregateRequest, Deadline, SyncError,
};
use std::time::Duration;
use tokio_test::assert_ok;

fn branch(index: usize) -> impl std::future::Future<Output = Result<usize, SyncError>> + Send {
    async move {
        match index % 3 {
            0 => Ok(index),
            1 => Err(SyncError::transport(format!("branch {} failed", index))),
            _ => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(index)
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_result_has_one_entry_per_key() {
    let deadline = Deadline::from_millis("batch", 250).unwrap();

    for n in 0..8 {
        let mut request = AggregateRequest::new();
        for i in 0..n {
            assert_ok!(request.add(format!("k{}", i), branch(i)));
        }

        let result = run_all(request, &deadline).await;

        assert_eq!(result.len(), n);
        for i in 0..n {
            let entry = result.get(&format!("k{}", i)).expect("key dropped");
            match i % 3 {
                0 => assert_eq!(entry.as_ref().ok(), Some(&i)),
                1 => assert!(!entry.as_ref().unwrap_err().is_timeout()),
                _ => assert!(entry.as_ref().unwrap_err().is_timeout()),
            }
        }
    }
}

#[tokio::test]
async fn test_latency_bounded_by_shared_deadline() {
    let deadline = Deadline::from_millis("batch", 200).unwrap();
    let request = AggregateRequest::new()
        .with("forever", std::future::pending::<Result<u64, SyncError>>())
        .unwrap()
        .with("slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1u64)
        })
        .unwrap()
        .with("fast", async { Ok(2u64) })
        .unwrap();

    let started = std::time::Instant::now();
    let result = run_all(request, &deadline).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(1_000), "took {:?}", elapsed);
    assert_eq!(result.len(), 3);
    assert_eq!(result.value("fast"), Some(&2));
}

#[tokio::test]
async fn test_returns_early_when_all_branches_finish() {
    let deadline = Deadline::from_millis("batch", 10_000).unwrap();
    let request = AggregateRequest::new()
        .with("a", async { Ok(1u64) })
        .unwrap()
        .with("b", async { Ok(2u64) })
        .unwrap();

    let started = std::time::Instant::now();
    let result = run_all(request, &deadline).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(result.failed_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_keeps_other_values() {
    let deadline = Deadline::from_millis("dashboard", 500).unwrap();
    let request = AggregateRequest::new()
        .with("A", async { Ok(11u64) })
        .unwrap()
        .with("B", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0u64)
        })
        .unwrap()
        .with("C", async { Ok(33u64) })
        .unwrap();

    let started = tokio::time::Instant::now();
    let result = run_all(request, &deadline).await;

    assert_eq!(result.value("A"), Some(&11));
    assert!(result.error("B").unwrap().is_timeout());
    assert_eq!(result.value("C"), Some(&33));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_millis(600));
}

#[tokio::test]
async fn test_run_safe_never_raises() {
    let deadline = Deadline::from_millis("safe", 200).unwrap();

    let crashed: u64 = run_safe(
        async {
            let parsed: u64 = "not-a-number".parse().expect("numeric stat");
            Ok(parsed)
        },
        17,
        &deadline,
        "crash",
    )
    .await;
    assert_eq!(crashed, 17);

    let errored = run_safe(
        async { Err::<u64, _>(SyncError::not_found("reviews")) },
        18,
        &deadline,
        "missing",
    )
    .await;
    assert_eq!(errored, 18);

    let stalled = run_safe(
        std::future::pending::<Result<u64, SyncError>>(),
        19,
        &deadline,
        "stall",
    )
    .await;
    assert_eq!(stalled, 19);
}

#[tokio::test]
async fn test_deadline_executor_returns_typed_timeout() {
    let deadline = Deadline::from_millis("listing_count", 50).unwrap();
    let err = run_with_deadline(std::future::pending::<Result<u64, SyncError>>(), &deadline)
        .await
        .unwrap_err();

    match err {
        SyncError::Timeout { label, elapsed } => {
            assert_eq!(label, "listing_count");
            assert!(elapsed >= Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}
