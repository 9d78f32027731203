//! Optional OpenTelemetry trace export over OTLP/HTTP.
//!
//! When `[telemetry]` appears in both the config and secrets files, spans
//! are batched and exported to the configured collector. Otherwise the
//! server logs to the console only.
//!
//! The [`BatchSpanProcessor`] exports from its own background thread, outside
//! the tokio runtime, so it needs a blocking `reqwest` client. That client is
//! built on a separate thread so construction never blocks the runtime.
//!
//! Console and export layers carry independent filters. Both default to this
//! crate only so `alloy`, `rocket` and `sqlx` noise stays out of traces.

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::ExporterBuildError;
use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor, SdkTracerProvider};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use url::Url;

const DEFAULT_SERVICE_NAME: &str = "cartfree";

/// Instrumentation scope reported with every span, distinct from the
/// `service.name` resource attribute.
const TRACER_NAME: &str = "cartfree-tracer";

/// `[telemetry]` in the plaintext config.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    pub(crate) endpoint: Url,
    pub(crate) service_name: Option<String>,
    pub(crate) environment: Option<String>,
}

/// `[telemetry]` in the secrets file.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySecrets {
    pub(crate) api_key: String,
}

#[derive(Clone)]
pub struct TelemetryCtx {
    endpoint: Url,
    api_key: String,
    service_name: String,
    environment: String,
    log_level: tracing::Level,
}

impl std::fmt::Debug for TelemetryCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryCtx")
            .field("endpoint", &self.endpoint.as_str())
            .field("service_name", &self.service_name)
            .field("environment", &self.environment)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl TelemetryCtx {
    pub(crate) fn new(
        config: TelemetryConfig,
        secrets: TelemetrySecrets,
        log_level: tracing::Level,
    ) -> Self {
        Self {
            endpoint: config.endpoint,
            api_key: secrets.api_key,
            service_name: config
                .service_name
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            environment: config
                .environment
                .unwrap_or_else(|| "development".to_string()),
            log_level,
        }
    }

    pub fn setup_telemetry(&self) -> Result<TelemetryGuard, TelemetryError> {
        let headers = HashMap::from([("authorization".to_string(), self.api_key.clone())]);

        let http_client = std::thread::spawn(|| {
            reqwest::blocking::Client::builder()
                .gzip(true)
                .build()
                .map_err(|e| format!("Failed to build HTTP client: {e}"))
        })
        .join()
        .map_err(|_| TelemetryError::ThreadSpawn)?
        .map_err(TelemetryError::HttpClient)?;

        let otlp_exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_http_client(http_client)
            .with_endpoint(self.endpoint.as_str())
            .with_headers(headers)
            .with_protocol(opentelemetry_otlp::Protocol::HttpBinary)
            .build()?;

        let batch_exporter = BatchSpanProcessor::builder(otlp_exporter)
            .with_batch_config(
                BatchConfigBuilder::default()
                    .with_max_export_batch_size(512)
                    .with_max_queue_size(2048)
                    .with_scheduled_delay(Duration::from_secs(3))
                    .build(),
            )
            .build();

        let tracer_provider = SdkTracerProvider::builder()
            .with_span_processor(batch_exporter)
            .with_resource(
                Resource::builder()
                    .with_service_name(self.service_name.clone())
                    .with_attributes(vec![KeyValue::new(
                        "deployment.environment",
                        self.environment.clone(),
                    )])
                    .build(),
            )
            .build();

        let tracer = tracer_provider.tracer(TRACER_NAME);

        let default_filter = format!("cartfree={}", self.log_level);

        let fmt_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| default_filter.clone().into());

        let telemetry_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| default_filter.into());

        let fmt_layer = tracing_subscriber::fmt::layer().with_filter(fmt_filter);
        let telemetry_layer = tracing_opentelemetry::layer()
            .with_tracer(tracer)
            .with_filter(telemetry_filter);

        let subscriber = Registry::default().with(fmt_layer).with(telemetry_layer);

        tracing::subscriber::set_global_default(subscriber)?;

        Ok(TelemetryGuard { tracer_provider })
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to build OTLP exporter")]
    OtlpExporter(#[from] ExporterBuildError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Failed to spawn HTTP client thread")]
    ThreadSpawn,

    #[error("Failed to set global subscriber")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Flushes and shuts down the exporter when dropped.
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.tracer_provider.force_flush() {
            eprintln!("Failed to flush telemetry spans: {e:?}");
        }

        if let Err(e) = self.tracer_provider.shutdown() {
            eprintln!("Failed to shutdown telemetry provider: {e:?}");
        }
    }
}
