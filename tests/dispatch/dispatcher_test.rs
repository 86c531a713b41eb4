//! Dispatcher concurrency, retry and budget behavior.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use snippet_gate::dispatch::{
    DispatchError, DispatchPolicy, Dispatcher, SandboxResponse, TransportFailure,
};
use snippet_gate::policy::Language;

use crate::fake_backend::{Fallback, FakeSandbox};

fn policy(max_concurrent: usize, max_retries: u32) -> DispatchPolicy {
    DispatchPolicy {
        max_concurrent,
        max_retries,
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_millis(400),
    }
}

fn python() -> Language {
    Language::new("python")
}

#[tokio::test(start_paused = true)]
async fn never_exceeds_concurrency_cap() {
    let fake = Arc::new(FakeSandbox::echo("ok").with_delay(Duration::from_millis(50)));
    let dispatcher = Arc::new(Dispatcher::new(fake.clone(), policy(2, 0)));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let dispatcher = Arc::clone(&dispatcher);
        handles.push(tokio::spawn(async move {
            dispatcher
                .execute(&python(), "print(1)", Duration::from_secs(10))
                .await
        }));
    }
    for handle in handles {
        let joined = handle.await;
        assert!(matches!(joined, Ok(Ok(_))));
    }

    assert_eq!(fake.calls(), 10);
    assert_eq!(fake.peak_in_flight(), 2);
    assert_eq!(dispatcher.available_slots(), 2);
}

#[tokio::test(start_paused = true)]
async fn forwards_language_and_code() {
    let fake = Arc::new(FakeSandbox::echo("2"));
    let dispatcher = Dispatcher::new(fake.clone(), policy(1, 0));

    let result = dispatcher
        .execute(&Language::new("javascript"), "console.log(1+1)", Duration::from_secs(1))
        .await;

    assert_eq!(result, Ok(SandboxResponse::with_output("2")));
    let requests = fake.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].language, "javascript");
    assert_eq!(requests[0].code, "console.log(1+1)");
}

#[tokio::test(start_paused = true)]
async fn retries_transient_failures_then_succeeds() {
    let fake = Arc::new(FakeSandbox::scripted(
        vec![
            Err(TransportFailure::Connect("refused".to_owned())),
            Err(TransportFailure::Status(503)),
        ],
        Fallback::Respond(SandboxResponse::with_output("done")),
    ));
    let dispatcher = Dispatcher::new(fake.clone(), policy(1, 2));

    let result = dispatcher
        .execute(&python(), "print('done')", Duration::from_secs(5))
        .await;

    assert_eq!(result, Ok(SandboxResponse::with_output("done")));
    assert_eq!(fake.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_k_retries() {
    let fake = Arc::new(FakeSandbox::new(Fallback::Fail(TransportFailure::Connect(
        "refused".to_owned(),
    ))));
    let dispatcher = Dispatcher::new(fake.clone(), policy(1, 3));

    let result = dispatcher
        .execute(&python(), "print(1)", Duration::from_secs(30))
        .await;

    match result {
        Err(DispatchError::Transport { attempts, failure }) => {
            assert_eq!(attempts, 4);
            assert!(matches!(failure, TransportFailure::Connect(_)));
        }
        other => panic!("expected transport failure, got {other:?}"),
    }
    assert_eq!(fake.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_up_to_cap() {
    let fake = Arc::new(FakeSandbox::new(Fallback::Fail(TransportFailure::Status(502))));
    let dispatcher = Dispatcher::new(fake.clone(), policy(1, 4));

    let started = Instant::now();
    let result = dispatcher
        .execute(&python(), "print(1)", Duration::from_secs(30))
        .await;

    assert!(matches!(result, Err(DispatchError::Transport { attempts: 5, .. })));
    // 100 + 200 + 400 + 400 (capped)
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1100));
    assert!(elapsed < Duration::from_millis(1150));
}

#[tokio::test(start_paused = true)]
async fn does_not_retry_client_errors_or_malformed_payloads() {
    for failure in [
        TransportFailure::Status(400),
        TransportFailure::Malformed("not json".to_owned()),
    ] {
        let fake = Arc::new(FakeSandbox::new(Fallback::Fail(failure.clone())));
        let dispatcher = Dispatcher::new(fake.clone(), policy(1, 5));

        let result = dispatcher
            .execute(&python(), "print(1)", Duration::from_secs(5))
            .await;

        assert_eq!(
            result,
            Err(DispatchError::Transport {
                attempts: 1,
                failure
            })
        );
        assert_eq!(fake.calls(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn runtime_errors_are_not_retried() {
    let fake = Arc::new(FakeSandbox::new(Fallback::Respond(SandboxResponse::with_error(
        "",
        "NameError: name 'x' is not defined",
    ))));
    let dispatcher = Dispatcher::new(fake.clone(), policy(1, 3));

    let result = dispatcher
        .execute(&python(), "print(x)", Duration::from_secs(5))
        .await;

    assert!(result.is_ok());
    assert_eq!(fake.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_backend_times_out_within_budget() {
    let fake = Arc::new(FakeSandbox::new(Fallback::Hang));
    let dispatcher = Dispatcher::new(fake.clone(), policy(2, 3));
    let budget = Duration::from_secs(2);

    let started = Instant::now();
    let result = dispatcher.execute(&python(), "print(1)", budget).await;
    let elapsed = started.elapsed();

    assert_eq!(result, Err(DispatchError::Timeout { budget }));
    assert!(elapsed >= budget);
    assert!(elapsed < budget + Duration::from_millis(50));
    assert_eq!(fake.in_flight(), 0, "in-flight call should be aborted");
    assert_eq!(dispatcher.available_slots(), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_past_budget_resolves_to_timeout() {
    let fake = Arc::new(
        FakeSandbox::new(Fallback::Fail(TransportFailure::Io("reset".to_owned())))
            .with_delay(Duration::from_millis(150)),
    );
    let dispatcher = Dispatcher::new(fake.clone(), policy(1, 10));
    let budget = Duration::from_millis(500);

    let started = Instant::now();
    let result = dispatcher.execute(&python(), "print(1)", budget).await;

    assert_eq!(result, Err(DispatchError::Timeout { budget }));
    assert!(started.elapsed() <= budget);
    // 150 call, 100 backoff, 150 call, then a 200ms backoff would overrun.
    assert_eq!(fake.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn waiting_for_a_slot_counts_against_budget() {
    let fake = Arc::new(FakeSandbox::new(Fallback::Hang));
    let dispatcher = Arc::new(Dispatcher::new(fake.clone(), policy(1, 0)));

    let hog = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            dispatcher
                .execute(&python(), "print(1)", Duration::from_secs(60))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(dispatcher.available_slots(), 0);

    let budget = Duration::from_secs(1);
    let result = dispatcher.execute(&python(), "print(2)", budget).await;
    assert_eq!(result, Err(DispatchError::Timeout { budget }));
    assert_eq!(fake.calls(), 1);

    hog.abort();
}

#[tokio::test(start_paused = true)]
async fn cancelling_the_caller_releases_the_slot() {
    let fake = Arc::new(FakeSandbox::new(Fallback::Hang));
    let dispatcher = Arc::new(Dispatcher::new(fake.clone(), policy(1, 0)));

    let handle = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            dispatcher
                .execute(&python(), "print(1)", Duration::from_secs(60))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(fake.in_flight(), 1);
    assert_eq!(dispatcher.available_slots(), 0);

    handle.abort();
    let joined = handle.await;
    assert!(joined.is_err_and(|e| e.is_cancelled()));

    assert_eq!(fake.in_flight(), 0);
    assert_eq!(dispatcher.available_slots(), 1);
}
