//! Telemetry with a live OTLP collector.
//!
//! Requires a collector accepting gRPC on localhost:4317:
//! ```sh
//! cargo test --test telemetry_export_test -- --ignored
//! ```

use opentelemetry::trace::{Span as _, Tracer as _};
use std::sync::OnceLock;
use taskq::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};

static TELEMETRY: OnceLock<TelemetryGuard> = OnceLock::new();

fn ensure_telemetry() -> &'static TelemetryGuard {
    TELEMETRY.get_or_init(|| {
        init_telemetry(TelemetryConfig {
            endpoint: Some("http://localhost:4317".to_string()),
            ..TelemetryConfig::new("taskq-export-test")
        })
        .expect("failed to init telemetry")
    })
}

#[test]
#[ignore] // Requires an OTLP collector
fn exporting_installs_global_tracer_provider() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let guard = ensure_telemetry();
        assert!(guard.is_exporting());

        // The no-op provider hands out spans with an invalid context.
        let mut span = opentelemetry::global::tracer("taskq-test").start("export check");
        assert!(span.span_context().is_valid());
        span.end();

        guard.force_flush();
    });
}
