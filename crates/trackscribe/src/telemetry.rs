//! Tracing subscriber setup, with optional OTLP trace export.
//!
//! Logs go to stderr; stdout carries the JSON records.

use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use scribeconf::TelemetryConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Timeout for OTLP exports - keeps an absent collector from stalling exit
const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Keeps the tracer provider alive; call [`Telemetry::shutdown`] before exit.
pub struct Telemetry {
    provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    /// Flush pending spans. Failures are logged, never fatal.
    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "OpenTelemetry shutdown failed");
            }
        }
    }
}

fn env_filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging, and trace export when an OTLP endpoint is configured.
/// Must run inside the tokio runtime.
pub fn init(config: &TelemetryConfig) -> Result<Telemetry> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if !config.otlp_enabled() {
        tracing_subscriber::registry()
            .with(env_filter(config))
            .with(fmt_layer)
            .init();
        return Ok(Telemetry { provider: None });
    }

    let resource = Resource::builder_empty()
        .with_service_name("trackscribe")
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let endpoint = config.otlp_endpoint.trim();
    let endpoint = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP span exporter")?;

    let provider = SdkTracerProvider::builder()
        .with_span_processor(
            opentelemetry_sdk::trace::BatchSpanProcessor::builder(exporter).build(),
        )
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("trackscribe");
    opentelemetry::global::set_tracer_provider(provider.clone());

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt_layer)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .init();

    tracing::info!(endpoint = %endpoint, "OpenTelemetry trace export enabled");
    Ok(Telemetry {
        provider: Some(provider),
    })
}
