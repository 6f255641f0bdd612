//! Tester integration tests

use isolink_core::error::{ISOLATE_TERMINATED, METHOD_NOT_FOUND, TIMEOUT};
use isolink_core::CallRequest;
use isolink_host::{from_fn, from_sync_fn, Isolate};
use isolink_tester::{ExpectError, ExpectResult, NotifyOnly, RpcTester, CHECK_FAILED};
use serde_json::json;
use std::time::{Duration, Instant};

fn ping_isolate() -> Isolate {
    Isolate::builder()
        .name("ping-pong")
        .handler("ping", from_sync_fn(|_| Ok(json!({"result": "pong"}))))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_ping_pong_suite() {
    let isolate = ping_isolate();

    let report = RpcTester::builder(isolate.handle())
        .check(ExpectResult::ping())
        .check(ExpectError::new("unknown", CallRequest::new("pong"), METHOD_NOT_FOUND))
        .check(NotifyOnly::new("notify", CallRequest::new("ping")))
        .build()
        .unwrap()
        .start_test()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.total(), 3);
    assert!(report.is_success(), "{:?}", report);
}

#[tokio::test]
async fn test_start_test_returns_before_slow_handler() {
    let isolate = Isolate::builder()
        .handler(
            "ping",
            from_fn(|_| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(json!({"result": "pong"}))
            }),
        )
        .build()
        .unwrap();

    let start = Instant::now();
    let run = RpcTester::new(isolate.handle()).start_test();
    assert!(start.elapsed() < Duration::from_millis(50));
    assert!(!run.is_finished());

    let report = run.wait().await.unwrap();
    assert!(report.is_success());
}

#[tokio::test]
async fn test_slow_handler_fails_with_timeout() {
    let isolate = Isolate::builder()
        .handler(
            "ping",
            from_fn(|_| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(json!({"result": "pong"}))
            }),
        )
        .build()
        .unwrap();

    let report = RpcTester::builder(isolate.handle())
        .call_timeout(Duration::from_millis(20))
        .build()
        .unwrap()
        .start_test()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.failed(), 1);
    assert_eq!(report.outcomes[0].error.as_ref().unwrap().code, TIMEOUT);
}

#[tokio::test]
async fn test_wrong_answer_is_check_failure() {
    let isolate = Isolate::builder()
        .handler("ping", from_sync_fn(|_| Ok(json!("pong"))))
        .handler("other", from_sync_fn(|_| Ok(json!({"result": "pong", "extra": 1}))))
        .build()
        .unwrap();

    let report = RpcTester::builder(isolate.handle())
        .check(ExpectResult::ping())
        .check(ExpectResult::new(
            "other returns pong",
            CallRequest::new("other"),
            isolink_core::CallResult::new().with("result", "pong"),
        ))
        .build()
        .unwrap()
        .run()
        .await;

    // "pong" is wrapped under "result" and matches; the extra field doesn't
    assert_eq!(report.passed(), 1);
    let failure = report.failures().next().unwrap();
    assert_eq!(failure.name, "other returns pong");
    assert_eq!(failure.error.as_ref().unwrap().code, CHECK_FAILED);
}

#[tokio::test]
async fn test_terminated_isolate_is_reported() {
    let isolate = ping_isolate();
    let handle = isolate.handle();
    isolate.shutdown().await.unwrap();

    let report = RpcTester::new(handle).start_test().wait().await.unwrap();

    assert!(!report.is_success());
    assert_eq!(
        report.outcomes[0].error.as_ref().unwrap().code,
        ISOLATE_TERMINATED
    );
}

#[tokio::test]
async fn test_report_serializes() {
    let isolate = ping_isolate();
    let report = RpcTester::new(isolate.handle()).run().await;

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["isolate"], "ping-pong");
    assert_eq!(value["outcomes"][0]["passed"], true);
}
