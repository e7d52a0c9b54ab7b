//! Logging and optional OpenTelemetry export

use crate::settings::Settings;
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FORMAT_ENV: &str = "SKYWATCH_LOG_FORMAT";
const DEFAULT_FILTER: &str = "skywatch=info";

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

/// Install the global subscriber
///
/// `SKYWATCH_LOG_FORMAT=json` switches to structured output. With `log_dir`
/// set, logs go to a daily-rolling file; keep the returned guard alive until
/// exit so buffered lines are flushed.
pub fn init_logging(settings: &Settings) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("invalid log filter")?;
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|f| f == "json");

    let (fmt_layer, guard): (BoxedLayer, Option<WorkerGuard>) = match &settings.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, "skywatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            if json {
                (layer.json().boxed(), Some(guard))
            } else {
                (layer.boxed(), Some(guard))
            }
        }
        None if json => (fmt::layer().json().boxed(), None),
        None => (fmt::layer().pretty().boxed(), None),
    };

    let mut layers: Vec<BoxedLayer> = vec![fmt_layer.with_filter(env_filter).boxed()];
    match otel_layer() {
        Ok(Some(layer)) => layers.push(layer),
        Ok(None) => {}
        Err(e) => eprintln!("OpenTelemetry disabled: {:#}", e),
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

/// Span export layer, present only when `OTEL_EXPORTER_OTLP_ENDPOINT` is set
///
/// ```text
/// OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 \
/// OTEL_SERVICE_NAME=skywatch-north \
///     ./skywatch
/// ```
fn otel_layer() -> Result<Option<BoxedLayer>> {
    let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
        return Ok(None);
    };

    #[cfg(feature = "telemetry")]
    {
        otel_layer_impl(&endpoint).map(Some)
    }

    #[cfg(not(feature = "telemetry"))]
    {
        eprintln!(
            "OTEL_EXPORTER_OTLP_ENDPOINT={} ignored: built without the 'telemetry' feature",
            endpoint
        );
        Ok(None)
    }
}

#[cfg(feature = "telemetry")]
fn otel_layer_impl(endpoint: &str) -> Result<BoxedLayer> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::TracerProvider;
    use opentelemetry_sdk::Resource;

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "skywatch".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("failed to build OTLP exporter")?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.clone(),
        )]))
        .build();
    let tracer = provider.tracer(service_name);
    opentelemetry::global::set_tracer_provider(provider);

    Ok(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
}

/// Flush pending spans before exit
pub fn shutdown() {
    #[cfg(feature = "telemetry")]
    opentelemetry::global::shutdown_tracer_provider();
}
