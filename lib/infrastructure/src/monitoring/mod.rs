pub mod meter;

use std::error::Error;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{ExporterBuildError, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing::Subscriber;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitoringConfig {
    pub service_name: String,
    pub app_name: String,
    #[serde(default)]
    pub format: LogFormat,
    pub logs: EnvFilterConfig,
    pub traces: EnvFilterConfig,
    pub otlp: Option<OtlpConfig>,
}

#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EnvFilterConfig {
    pub default_level: String,
    #[serde(default)]
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct OtlpConfig {
    pub url: Option<String>,
}

impl TryFrom<&EnvFilterConfig> for EnvFilter {
    type Error = ParseError;

    fn try_from(config: &EnvFilterConfig) -> Result<Self, Self::Error> {
        EnvFilter::builder()
            .with_default_directive(config.default_level.parse()?)
            .parse(config.filters.join(","))
    }
}

impl MonitoringConfig {
    /// Installs the global subscriber. Without an `otlp` section only console output is produced.
    pub fn init(&self) -> Result<(), Box<dyn Error>> {
        let Some(otlp) = &self.otlp else {
            tracing_subscriber::registry().with(self.fmt_layer()?).init();
            return Ok(());
        };

        let resource = Resource::builder()
            .with_attribute(KeyValue::new("service.name", self.service_name.clone()))
            .with_attribute(KeyValue::new("app.name", self.app_name.clone()))
            .build();

        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::default());

        let logger_provider = init_logs(resource.clone(), otlp.url.clone())?;
        let logging_layer =
            OpenTelemetryTracingBridge::new(&logger_provider).with_filter(EnvFilter::try_from(&self.logs)?);

        let tracer_provider = init_traces(resource.clone(), otlp.url.clone())?;
        let tracer = tracer_provider.tracer(self.app_name.to_owned());
        let tracing_layer = OpenTelemetryLayer::new(tracer).with_filter(EnvFilter::try_from(&self.traces)?);

        opentelemetry::global::set_meter_provider(init_metrics(resource, otlp.url.clone())?);

        tracing_subscriber::registry()
            .with(tracing_layer)
            .with(logging_layer)
            .with(self.fmt_layer()?)
            .init();

        Ok(())
    }

    fn fmt_layer<S>(&self) -> Result<Box<dyn Layer<S> + Send + Sync>, ParseError>
    where
        S: Subscriber + for<'span> LookupSpan<'span> + Send + Sync + 'static,
    {
        let filter = EnvFilter::try_from(&self.logs)?;
        let layer = match self.format {
            LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
            LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        };

        Ok(layer.with_filter(filter).boxed())
    }
}

fn init_traces(resource: Resource, url: Option<String>) -> Result<SdkTracerProvider, ExporterBuildError> {
    let builder = SdkTracerProvider::builder().with_resource(resource);

    Ok(match url {
        Some(url) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(url)
                .build()?;
            builder.with_batch_exporter(exporter).build()
        }
        None => builder
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build(),
    })
}

fn init_metrics(resource: Resource, url: Option<String>) -> Result<SdkMeterProvider, ExporterBuildError> {
    let builder = SdkMeterProvider::builder().with_resource(resource);

    Ok(match url {
        Some(url) => {
            let exporter = opentelemetry_otlp::MetricExporter::builder()
                .with_tonic()
                .with_endpoint(url)
                .build()?;
            let reader = PeriodicReader::builder(exporter)
                .with_interval(std::time::Duration::from_secs(30))
                .build();
            builder.with_reader(reader).build()
        }
        None => {
            let reader = PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
                .with_interval(std::time::Duration::from_secs(60))
                .build();
            builder.with_reader(reader).build()
        }
    })
}

fn init_logs(resource: Resource, url: Option<String>) -> Result<SdkLoggerProvider, ExporterBuildError> {
    let builder = SdkLoggerProvider::builder().with_resource(resource);

    Ok(match url {
        Some(url) => {
            let exporter = opentelemetry_otlp::LogExporter::builder()
                .with_tonic()
                .with_endpoint(url)
                .build()?;
            builder.with_batch_exporter(exporter).build()
        }
        None => builder
            .with_simple_exporter(opentelemetry_stdout::LogExporter::default())
            .build(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_metrics_provider_builds_without_otlp_url() {
        let provider = init_metrics(Resource::builder().build(), None).unwrap();

        assert!(provider.shutdown().is_ok());
    }

    #[test]
    fn env_filter_combines_default_level_and_filters() {
        let config = EnvFilterConfig {
            default_level: "info".to_owned(),
            filters: vec!["intuis_sync=debug".to_owned(), "sqlx=warn".to_owned()],
        };

        let filter = EnvFilter::try_from(&config).unwrap();

        assert!(filter.to_string().contains("intuis_sync=debug"));
    }

    #[test]
    fn env_filter_rejects_invalid_default_level() {
        let config = EnvFilterConfig {
            default_level: "intuis_sync=loud".to_owned(),
            filters: vec![],
        };

        assert!(EnvFilter::try_from(&config).is_err());
    }
}
