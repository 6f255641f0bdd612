//! Registers `ping` on an isolate, runs the native tester against it and
//! exits according to the harness configuration (see `isolink::harness`).

use isolink::harness::{ping_handler, Harness, HarnessConfig, HarnessOutcome, PING_METHOD};
use isolink::{Isolate, ObservabilityConfig, Result, Scheduler};

#[tokio::main]
async fn main() {
    let observability = ObservabilityConfig::from_env("ping-pong");
    let metrics = observability.enable_metrics;
    if let Err(e) = isolink::init_observability(observability) {
        eprintln!("Failed to initialize observability: {}", e);
    }

    let config = HarnessConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid harness configuration, using defaults");
        HarnessConfig::default()
    });
    let strict = config.strict;

    let exit_code = match run(config, metrics).await {
        Ok(outcome) => outcome.exit_code,
        Err(e) => {
            tracing::error!(error = %e, "Harness failed");
            i32::from(strict)
        }
    };

    isolink::shutdown_observability();
    std::process::exit(exit_code);
}

async fn run(config: HarnessConfig, metrics: bool) -> Result<HarnessOutcome> {
    let mut builder = Isolate::builder()
        .name("main")
        .handler(PING_METHOD, ping_handler());
    if metrics {
        builder = builder.with_metrics().service_name("ping-pong");
    }
    let isolate = builder.build()?;

    let mut harness = Harness::new(isolate.handle(), Scheduler::current()?, config);
    if metrics {
        harness = harness.with_metrics();
    }
    let outcome = harness.run().await?;

    isolate.shutdown().await?;
    Ok(outcome)
}
