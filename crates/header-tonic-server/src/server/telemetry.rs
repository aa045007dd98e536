//! Logging, tracing and metrics for the header service.
//!
//! Log events always go to a pretty `fmt` layer filtered by `RUST_LOG`
//! (default `info`). Cargo features add OpenTelemetry export:
//!
//! - `tracing`: one span per `GenerateHeader` call.
//! - `metrics`: `requests`, `headers_generated` (tagged with `path_type`) and
//!   `rejected` counters.
//! - `stdout` / `honeycomb`: where the above are exported. Honeycomb reads
//!   `HONEYCOMB_API_KEY`, `HONEYCOMB_DATASET`, `HONEYCOMB_ENDPOINT` and
//!   `HONEYCOMB_COMPRESSION`.
//!
//! ```bash
//! cargo run --bin header-tonic-server --features tracing,metrics,stdout
//! ```
//!
//! The `record_*` functions are always callable and do nothing until
//! [`init_telemetry`] has installed a meter with the `metrics` feature on.

#[cfg(all(
    any(feature = "honeycomb", feature = "stdout"),
    not(any(feature = "tracing", feature = "metrics"))
))]
compile_error!("The 'honeycomb' and 'stdout' exporters require 'tracing' or 'metrics'.");

use header_tonic_core::types::PathType;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semvcns;
#[cfg(any(feature = "metrics", feature = "tracing"))]
use std::time::Duration;

#[cfg(feature = "tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::trace as sdktrace;

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Meter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "honeycomb")]
use opentelemetry_otlp::{Compression, Protocol, WithExportConfig, WithTonicConfig};
#[cfg(feature = "honeycomb")]
use tonic::{metadata::MetadataMap, transport::ClientTlsConfig};

const SERVICE_NAME: &str = "header-tonic";

/// How often buffered spans and metrics are pushed to an exporter.
#[cfg(any(feature = "metrics", feature = "tracing"))]
const EXPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Providers that must outlive the server so buffered data can be flushed.
pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down whichever providers are compiled in. Failures
    /// go to stderr since the subscriber may already be gone.
    pub fn shutdown(&self) {
        #[cfg(feature = "tracing")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

/// Installs the global subscriber and, when enabled, the OpenTelemetry
/// tracer and meter providers.
pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let exporters = Exporters::from_env()?;

    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .pretty(),
        );

    #[cfg(feature = "tracing")]
    let (registry, tracer_provider) = {
        let provider = build_tracer_provider(&exporters)?;
        opentelemetry::global::set_text_map_propagator(
            opentelemetry_sdk::propagation::TraceContextPropagator::new(),
        );
        opentelemetry::global::set_tracer_provider(provider.clone());
        let layer = tracing_opentelemetry::layer()
            .with_tracer(provider.tracer_with_scope(scope.clone()))
            .with_error_records_to_exceptions(true);
        (registry.with(layer), provider)
    };

    #[cfg(feature = "metrics")]
    let (registry, meter_provider) = {
        let provider = build_meter_provider(&exporters)?;
        opentelemetry::global::set_meter_provider(provider.clone());
        let _ = METRICS.set(Metrics::new(&opentelemetry::global::meter_with_scope(scope)));
        let layer = tracing_opentelemetry::MetricsLayer::new(provider.clone());
        (registry.with(layer), provider)
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

/// Remote exporter settings, read once and shared by the span and metric
/// pipelines.
#[cfg(any(feature = "metrics", feature = "tracing"))]
struct Exporters {
    #[cfg(feature = "honeycomb")]
    honeycomb: HoneycombConfig,
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
impl Exporters {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            #[cfg(feature = "honeycomb")]
            honeycomb: HoneycombConfig::from_env()?,
        })
    }
}

/// OTLP settings shared by the span and metric exporters.
#[cfg(feature = "honeycomb")]
struct HoneycombConfig {
    metadata: MetadataMap,
    endpoint: String,
    compression: Compression,
}

#[cfg(feature = "honeycomb")]
impl HoneycombConfig {
    fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        use anyhow::Context;
        use std::str::FromStr;

        let var = |key: &str| lookup(key).with_context(|| format!("missing `{key}`"));

        let mut metadata = MetadataMap::new();
        metadata.insert(
            "x-honeycomb-team",
            var("HONEYCOMB_API_KEY")?
                .parse()
                .context("invalid API key")?,
        );
        metadata.insert(
            "x-honeycomb-dataset",
            var("HONEYCOMB_DATASET")?
                .parse()
                .context("invalid dataset")?,
        );

        let compression =
            Compression::from_str(&var("HONEYCOMB_COMPRESSION")?.to_ascii_lowercase())?;

        Ok(Self {
            metadata,
            endpoint: var("HONEYCOMB_ENDPOINT")?,
            compression,
        })
    }

    /// Applies the endpoint, credentials and transport settings to an OTLP
    /// tonic exporter builder.
    fn apply<B: WithTonicConfig + WithExportConfig>(&self, builder: B) -> B {
        builder
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_metadata(self.metadata.clone())
            .with_compression(self.compression)
            .with_endpoint(self.endpoint.clone())
            .with_protocol(Protocol::Grpc)
            .with_timeout(Duration::from_secs(10))
    }
}

#[cfg(feature = "tracing")]
#[cfg_attr(not(feature = "honeycomb"), allow(unused_variables))]
fn build_tracer_provider(exporters: &Exporters) -> anyhow::Result<sdktrace::SdkTracerProvider> {
    #[cfg(any(feature = "stdout", feature = "honeycomb"))]
    fn batched<E>(exporter: E) -> sdktrace::BatchSpanProcessor
    where
        E: sdktrace::SpanExporter + Send + Sync + 'static,
    {
        sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(EXPORT_INTERVAL)
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build()
    }

    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_span_processor(batched(opentelemetry_stdout::SpanExporter::default()));

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;
        let exporter = exporters
            .honeycomb
            .apply(opentelemetry_otlp::SpanExporter::builder().with_tonic())
            .build()
            .context("failed to build span exporter")?;
        builder.with_span_processor(batched(exporter))
    };

    Ok(builder.build())
}

#[cfg(feature = "metrics")]
#[cfg_attr(not(feature = "honeycomb"), allow(unused_variables))]
fn build_meter_provider(exporters: &Exporters) -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_reader(
        sdkmetrics::PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
            .with_interval(EXPORT_INTERVAL)
            .build(),
    );

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;
        let exporter = exporters
            .honeycomb
            .apply(opentelemetry_otlp::MetricExporter::builder().with_tonic())
            .with_temporality(sdkmetrics::Temporality::Delta)
            .build()
            .context("failed to build metric exporter")?;
        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "metrics")]
struct Metrics {
    requests: Counter<u64>,
    headers_generated: Counter<u64>,
    rejected: Counter<u64>,
}

#[cfg(feature = "metrics")]
static METRICS: OnceLock<Metrics> = OnceLock::new();

#[cfg(feature = "metrics")]
impl Metrics {
    fn new(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter("requests")
                .with_description("GenerateHeader calls received")
                .build(),
            headers_generated: meter
                .u64_counter("headers_generated")
                .with_description("Headers issued, by path type")
                .build(),
            rejected: meter
                .u64_counter("rejected")
                .with_description("Calls rejected for an unknown path type")
                .build(),
        }
    }
}

pub fn record_request() {
    #[cfg(feature = "metrics")]
    {
        if let Some(metrics) = METRICS.get() {
            metrics.requests.add(1, &[]);
        }
    }
}

pub fn record_header_generated(path_type: PathType) {
    #[cfg(feature = "metrics")]
    {
        if let Some(metrics) = METRICS.get() {
            let attrs = [KeyValue::new("path_type", path_type.as_str())];
            metrics.headers_generated.add(1, &attrs);
        }
    }
    #[cfg(not(feature = "metrics"))]
    let _ = path_type;
}

pub fn record_rejected() {
    #[cfg(feature = "metrics")]
    {
        if let Some(metrics) = METRICS.get() {
            metrics.rejected.add(1, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uninstalled_providers() -> TelemetryProviders {
        TelemetryProviders {
            #[cfg(feature = "tracing")]
            tracer_provider: sdktrace::SdkTracerProvider::builder().build(),
            #[cfg(feature = "metrics")]
            meter_provider: sdkmetrics::SdkMeterProvider::builder().build(),
        }
    }

    #[test]
    fn recording_before_init_is_a_no_op() {
        record_request();
        for path_type in PathType::ALL {
            record_header_generated(path_type);
        }
        record_rejected();
    }

    #[test]
    fn shutdown_without_init_does_not_panic() {
        uninstalled_providers().shutdown();
    }

    #[cfg(feature = "honeycomb")]
    #[test]
    fn honeycomb_config_reads_every_variable() {
        let env = |key: &str| {
            let value = match key {
                "HONEYCOMB_API_KEY" => "key",
                "HONEYCOMB_DATASET" => "headers",
                "HONEYCOMB_ENDPOINT" => "https://api.honeycomb.io:443",
                "HONEYCOMB_COMPRESSION" => "GZIP",
                _ => return None,
            };
            Some(value.to_string())
        };

        let config = HoneycombConfig::from_lookup(env).unwrap();
        assert_eq!(config.endpoint, "https://api.honeycomb.io:443");
        let header = |name: &str| config.metadata.get(name).unwrap().to_str().unwrap();
        assert_eq!(header("x-honeycomb-team"), "key");
        assert_eq!(header("x-honeycomb-dataset"), "headers");

        let missing = HoneycombConfig::from_lookup(|key| {
            (key != "HONEYCOMB_ENDPOINT").then(|| env(key)).flatten()
        });
        assert!(missing.unwrap_err().to_string().contains("HONEYCOMB_ENDPOINT"));
    }
}
