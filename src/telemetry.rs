use anyhow::Context;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{trace as sdktrace, Resource};
use opentelemetry_semantic_conventions::resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,plant_care_pipeline=info,sqlx=warn,sea_orm=warn,rumqttc=warn";

/// Installs the global subscriber.
///
/// `RUST_LOG` overrides the filter, `RUST_LOG_FORMAT=json` switches to JSON
/// lines, and spans are exported over OTLP when `OTEL_EXPORTER_OTLP_ENDPOINT`
/// is set.
pub fn init_telemetry(service_name: &str) -> anyhow::Result<()> {
    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();

    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into()),
    );

    let registry = tracing_subscriber::registry().with(env_filter);

    let otel_layer = match otlp_endpoint {
        Some(endpoint) => {
            let resource = Resource::new(vec![KeyValue::new(
                resource::SERVICE_NAME,
                service_name.to_string(),
            )]);

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .with_trace_config(
                    sdktrace::config()
                        .with_resource(resource)
                        .with_sampler(sdktrace::Sampler::AlwaysOn),
                )
                .install_batch(opentelemetry_sdk::runtime::Tokio)
                .context("failed to install OpenTelemetry tracer")?;

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    if log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true);
        registry
            .with(otel_layer)
            .with(fmt_layer)
            .try_init()
            .context("failed to install tracing subscriber")?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer();
        registry
            .with(otel_layer)
            .with(fmt_layer)
            .try_init()
            .context("failed to install tracing subscriber")?;
    }
    Ok(())
}

/// Flushes buffered spans. Safe to call when OTLP export is disabled.
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}
