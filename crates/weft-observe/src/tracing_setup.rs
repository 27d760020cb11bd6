//! Tracing subscriber initialization for engine hosts.
//!
//! Libraries in this workspace only emit `tracing` events; the process
//! embedding the engine decides how they are rendered and exported. This
//! module gives hosts a one-call setup: a structured fmt layer driven by
//! `RUST_LOG`, optionally bridged to OpenTelemetry.
//!
//! # Usage
//!
//! ```no_run
//! use weft_observe::tracing_setup::TracingOptions;
//!
//! // Structured logging only.
//! weft_observe::tracing_setup::init(TracingOptions::default()).unwrap();
//!
//! // With OpenTelemetry export to stdout (local development; swap the
//! // exporter for OTLP in production).
//! weft_observe::tracing_setup::init(TracingOptions {
//!     service_name: "my-service",
//!     otel_stdout: true,
//! })
//! .unwrap();
//! ```

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Stores the OTel tracer provider so it can be shut down cleanly on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Subscriber setup options.
#[derive(Debug, Clone, Copy)]
pub struct TracingOptions {
    /// Service name reported on exported spans.
    pub service_name: &'static str,
    /// Bridge tracing spans to OpenTelemetry with a stdout exporter.
    pub otel_stdout: bool,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            service_name: "weft",
            otel_stdout: false,
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Always installs a structured `fmt` layer with target visibility and span
/// close timing, filtered by `RUST_LOG`. With `otel_stdout` set, spans are
/// additionally exported through OpenTelemetry.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been set.
pub fn init(options: TracingOptions) -> Result<(), Box<dyn std::error::Error>> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    let env_filter = EnvFilter::from_default_env();

    if options.otel_stdout {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer(options.service_name);
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        // Keep the provider reachable for shutdown and register it globally.
        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    Ok(())
}

/// Flush pending spans and shut down the OpenTelemetry tracer provider.
///
/// No-op when OTel export was never enabled.
pub fn shutdown() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "tracer provider shutdown failed");
        }
    }
}
