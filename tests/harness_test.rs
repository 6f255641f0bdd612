//! End-to-end tests of the ping/pong harness

use isolink::harness::{
    ping_handler, ExitPolicy, Harness, HarnessConfig, DEFAULT_EXIT_DELAY, PING_METHOD,
};
use isolink::host::from_fn;
use isolink::{CallRequest, Isolate, Scheduler};
use serde_json::json;
use std::time::{Duration, Instant};

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("isolink=debug")
        .with_test_writer()
        .try_init();
}

fn ping_isolate() -> Isolate {
    Isolate::builder()
        .name("main")
        .handler(PING_METHOD, ping_handler())
        .build()
        .unwrap()
}

fn slow_ping_isolate(delay: Duration) -> Isolate {
    Isolate::builder()
        .name("slow")
        .handler(
            PING_METHOD,
            from_fn(move |_| async move {
                tokio::time::sleep(delay).await;
                Ok(json!({"result": "pong"}))
            }),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_ping_returns_pong() {
    let isolate = ping_isolate();

    let result = isolate.handle().execute(CallRequest::new("ping")).await.unwrap();

    assert_eq!(result.get_str("result"), Some("pong"));
}

#[tokio::test]
async fn test_fixed_delay_exits_zero_after_delay() {
    init_logs();
    let isolate = ping_isolate();
    let config = HarnessConfig::default().with_exit_policy(ExitPolicy::FixedDelay(DEFAULT_EXIT_DELAY));

    let start = Instant::now();
    let outcome = Harness::new(isolate.handle(), Scheduler::current().unwrap(), config)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.exit_code, 0);
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert!(outcome.elapsed >= Duration::from_millis(100));
    assert!(outcome.elapsed < Duration::from_secs(2));
    assert!(outcome.report.unwrap().is_success());
}

#[tokio::test]
async fn test_fixed_delay_exits_zero_when_tester_is_late() {
    let isolate = slow_ping_isolate(Duration::from_millis(300));
    let config = HarnessConfig::default()
        .with_exit_policy(ExitPolicy::FixedDelay(Duration::from_millis(50)));

    let outcome = Harness::new(isolate.handle(), Scheduler::current().unwrap(), config)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.report.is_none());
}

#[tokio::test]
async fn test_on_completion_returns_early() {
    init_logs();
    let isolate = ping_isolate();
    let config = HarnessConfig::default().with_exit_policy(ExitPolicy::OnCompletion {
        guard: Duration::from_secs(5),
    });

    let outcome = Harness::new(isolate.handle(), Scheduler::current().unwrap(), config)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.elapsed < Duration::from_secs(1));
    let report = outcome.report.unwrap();
    assert_eq!(report.total(), 1);
    assert!(report.is_success());
}

#[tokio::test]
async fn test_on_completion_bounded_by_guard() {
    let isolate = slow_ping_isolate(Duration::from_millis(500));
    let config = HarnessConfig::default().with_exit_policy(ExitPolicy::OnCompletion {
        guard: Duration::from_millis(50),
    });

    let outcome = Harness::new(isolate.handle(), Scheduler::current().unwrap(), config)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.report.is_none());
    assert!(outcome.elapsed < Duration::from_millis(400));
}

#[tokio::test]
async fn test_strict_fails_on_bad_answer() {
    let isolate = Isolate::builder()
        .handler(PING_METHOD, from_fn(|_| async { Ok(json!({"result": "ping"})) }))
        .build()
        .unwrap();
    let config = HarnessConfig::default().strict(true);

    let outcome = Harness::new(isolate.handle(), Scheduler::current().unwrap(), config)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.exit_code, 1);
    assert_eq!(outcome.report.unwrap().failed(), 1);
}

#[tokio::test]
async fn test_non_strict_ignores_failures() {
    let isolate = Isolate::builder().build().unwrap();

    let outcome = Harness::new(
        isolate.handle(),
        Scheduler::current().unwrap(),
        HarnessConfig::default(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(outcome.exit_code, 0);
    assert!(!outcome.report.unwrap().is_success());
}

#[tokio::test]
async fn test_iterations_and_metrics() {
    let isolate = ping_isolate();
    let config = HarnessConfig::default()
        .iterations(4)
        .with_exit_policy(ExitPolicy::OnCompletion {
            guard: Duration::from_secs(5),
        });

    let outcome = Harness::new(isolate.handle(), Scheduler::current().unwrap(), config)
        .with_metrics()
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.report.unwrap().total(), 4);
}
