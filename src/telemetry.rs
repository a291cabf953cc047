//! Structured logging everywhere, optional OpenTelemetry OTLP export behind
//! the `telemetry` feature.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[cfg(feature = "telemetry")]
mod otlp {
    use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
    use opentelemetry_sdk::{
        Resource,
        metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider},
        trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
    };
    use opentelemetry_semantic_conventions::{
        SCHEMA_URL,
        attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION},
    };

    pub fn resource() -> Resource {
        let deployment_env =
            std::env::var("DEPLOYMENT_ENV").unwrap_or_else(|_| "develop".to_string());
        Resource::builder()
            .with_service_name(env!("CARGO_PKG_NAME"))
            .with_schema_url(
                [
                    KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                    KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, deployment_env),
                ],
                SCHEMA_URL,
            )
            .build()
    }

    pub fn init_meter_provider() -> SdkMeterProvider {
        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_temporality(opentelemetry_sdk::metrics::Temporality::default())
            .build()
            .expect("failed to build OTLP metric exporter");
        let reader = PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(30))
            .build();
        let meter_provider = MeterProviderBuilder::default()
            .with_resource(resource())
            .with_reader(reader)
            .build();
        global::set_meter_provider(meter_provider.clone());
        meter_provider
    }

    pub fn init_tracer_provider() -> SdkTracerProvider {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .build()
            .expect("failed to build OTLP span exporter");
        SdkTracerProvider::builder()
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                1.0,
            ))))
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(resource())
            .with_batch_exporter(exporter)
            .build()
    }
}

/// Owns the telemetry providers so their exporters flush on `Drop`.
pub struct Telemetry {
    #[cfg(feature = "telemetry")]
    tracer_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
    #[cfg(feature = "telemetry")]
    meter_provider: Option<opentelemetry_sdk::metrics::SdkMeterProvider>,
}

impl Telemetry {
    /// Initializes logging from `$LOG_LEVEL` (falling back to
    /// `$RUST_LOG`, then `info`), and OpenTelemetry export if
    /// `OTEL_EXPORTER_OTLP_ENDPOINT` is set and the `telemetry` feature is
    /// compiled in.
    pub fn new() -> Self {
        let env_filter = EnvFilter::try_from_env("LOG_LEVEL")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));

        #[cfg(feature = "telemetry")]
        {
            if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
                let tracer_provider = otlp::init_tracer_provider();
                let meter_provider = otlp::init_meter_provider();
                let tracer = tracer_provider.tracer("claim-relay");

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer())
                    .with(tracing_opentelemetry::MetricsLayer::new(
                        meter_provider.clone(),
                    ))
                    .with(tracing_opentelemetry::OpenTelemetryLayer::new(tracer))
                    .init();

                tracing::info!("OpenTelemetry tracing and metrics exporter is enabled");
                return Self {
                    tracer_provider: Some(tracer_provider),
                    meter_provider: Some(meter_provider),
                };
            }
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        tracing::info!("OpenTelemetry is not enabled");

        #[cfg(feature = "telemetry")]
        {
            Self {
                tracer_provider: None,
                meter_provider: None,
            }
        }
        #[cfg(not(feature = "telemetry"))]
        {
            Self {}
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "telemetry")]
impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(tracer_provider) = self.tracer_provider.as_ref() {
            if let Err(err) = tracer_provider.shutdown() {
                eprintln!("{err:?}");
            }
        }
        if let Some(meter_provider) = self.meter_provider.as_ref() {
            if let Err(err) = meter_provider.shutdown() {
                eprintln!("{err:?}");
            }
        }
    }
}
