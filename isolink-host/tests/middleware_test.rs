//! Middleware integration tests

use isolink_core::{CallRequest, Error, Result};
use isolink_host::{
    from_sync_fn, CountingMiddleware, Isolate, LoggingMiddleware, MiddlewareAction,
    MiddlewareContext, SyncMiddleware, TracingMiddleware,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Answers `ping` itself and rejects `forbidden`
struct GateMiddleware;

impl SyncMiddleware for GateMiddleware {
    fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
        match ctx.method.as_str() {
            "ping" => Ok(MiddlewareAction::ShortCircuit(json!({"result": "cached"}))),
            "forbidden" => Err(Error::InvalidRequest("forbidden".to_string())),
            _ => Ok(MiddlewareAction::Continue),
        }
    }

    fn post_handle(&self, _ctx: &mut MiddlewareContext, _result: &Result<Value>) -> Result<()> {
        Ok(())
    }
}

/// Records which isolate the call ran on
struct IsolateNameMiddleware;

impl SyncMiddleware for IsolateNameMiddleware {
    fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
        ctx.params = Some(json!(ctx.isolate.clone()));
        Ok(MiddlewareAction::Continue)
    }

    fn post_handle(&self, _ctx: &mut MiddlewareContext, _result: &Result<Value>) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_middleware_chain_on_isolate() {
    let counter = Arc::new(CountingMiddleware::new());

    let isolate = Isolate::builder()
        .use_sync_middleware(LoggingMiddleware)
        .use_middleware(Arc::new(TracingMiddleware::new()))
        .use_middleware(counter.clone())
        .handler("ping", from_sync_fn(|_| Ok(json!({"result": "pong"}))))
        .handler("fail", from_sync_fn(|_| Err(Error::Internal("nope".to_string()))))
        .build()
        .unwrap();
    let handle = isolate.handle();

    handle.execute(CallRequest::new("ping")).await.unwrap();
    assert!(handle.execute(CallRequest::new("fail")).await.is_err());

    assert_eq!(counter.calls(), 2);
    assert_eq!(counter.failures(), 1);
}

#[tokio::test]
async fn test_short_circuit_and_rejection() {
    let isolate = Isolate::builder()
        .use_sync_middleware(GateMiddleware)
        .handler("ping", from_sync_fn(|_| Ok(json!({"result": "pong"}))))
        .handler("forbidden", from_sync_fn(|_| Ok(json!("unreachable"))))
        .build()
        .unwrap();
    let handle = isolate.handle();

    let result = handle.execute(CallRequest::new("ping")).await.unwrap();
    assert_eq!(result.get_str("result"), Some("cached"));

    let result = handle.execute(CallRequest::new("forbidden")).await;
    assert!(matches!(result, Err(Error::InvalidRequest(_))));
}

#[tokio::test]
async fn test_middleware_sees_isolate_name() {
    let isolate = Isolate::builder()
        .name("named")
        .use_sync_middleware(IsolateNameMiddleware)
        .handler("whereami", from_sync_fn(|params| Ok(params.unwrap_or_default())))
        .build()
        .unwrap();

    let result = isolate
        .handle()
        .execute(CallRequest::new("whereami"))
        .await
        .unwrap();

    assert_eq!(result.get_str("result"), Some("named"));
}

#[tokio::test]
async fn test_unknown_method_skips_middleware() {
    let counter = Arc::new(CountingMiddleware::new());
    let isolate = Isolate::builder()
        .use_middleware(counter.clone())
        .build()
        .unwrap();

    let result = isolate.handle().execute(CallRequest::new("ping")).await;

    assert!(matches!(result, Err(Error::MethodNotFound(_))));
    assert_eq!(counter.calls(), 0);
}
