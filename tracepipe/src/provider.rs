//! The single owned entry point wiring both pipelines together.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, MetricError, TraceError};
use crate::metrics::{Meter, MetricExporter, MetricRegistry, PeriodicReader};
use crate::propagation::{BaggagePropagator, CompositePropagator, TraceContextPropagator};
use crate::trace::{
    BatchConfig, BatchSpanProcessor, ShouldSample, SpanExporter, Tracer, TracerProvider,
};
use crate::{KeyValue, Resource};

/// Owns the whole pipeline: tracer provider, metric registry, periodic
/// reader and the default propagator stack.
///
/// Construction is all-or-nothing: `build` validates the configuration
/// and a provider that exists is ready to use. Shutdown is ordered:
/// spans drain first so the final metric collection can still count
/// them, then metrics; a failure in one stage never skips the other.
#[derive(Debug)]
pub struct TelemetryProvider {
    tracer_provider: TracerProvider,
    registry: Arc<MetricRegistry>,
    reader: PeriodicReader,
    resource: Resource,
    propagator: CompositePropagator,
}

impl TelemetryProvider {
    /// Start building a provider.
    pub fn builder() -> TelemetryProviderBuilder {
        TelemetryProviderBuilder::default()
    }

    /// A tracer creating spans through this provider.
    pub fn tracer(&self) -> Tracer {
        self.tracer_provider.tracer()
    }

    /// A meter creating instruments backed by this provider's registry.
    pub fn meter(&self) -> Meter {
        Meter::new(self.registry.clone())
    }

    /// The underlying tracer provider.
    pub fn tracer_provider(&self) -> &TracerProvider {
        &self.tracer_provider
    }

    /// The periodic reader driving metric export.
    pub fn reader(&self) -> &PeriodicReader {
        &self.reader
    }

    /// The resource attached to everything this provider exports.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// The default propagator stack: trace context then baggage.
    pub fn propagator(&self) -> &CompositePropagator {
        &self.propagator
    }

    /// Flush both pipelines now. All stages run; every error is
    /// collected.
    pub fn force_flush(&self) -> Result<(), Vec<Error>> {
        let mut errors = Vec::new();
        if let Err(err) = self.tracer_provider.force_flush() {
            errors.push(err.into());
        }
        if let Err(err) = self.reader.force_flush() {
            errors.push(err.into());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Shut the pipeline down within `timeout`.
    ///
    /// Spans are drained and their processors shut down first, then the
    /// metric reader takes a final collection and shuts down. The
    /// second stage runs even when the first fails; all errors are
    /// returned together.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), Vec<Error>> {
        let deadline = Instant::now() + timeout;
        let mut errors = Vec::new();

        if let Err(err) = self.tracer_provider.shutdown_with_timeout(timeout) {
            errors.push(err.into());
        }

        let remaining = deadline
            .saturating_duration_since(Instant::now())
            .max(Duration::from_millis(1));
        if let Err(err) = self.reader.shutdown_with_timeout(remaining) {
            errors.push(err.into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Builder for [`TelemetryProvider`].
#[derive(Debug, Default)]
pub struct TelemetryProviderBuilder {
    service_name: Option<Cow<'static, str>>,
    service_version: Option<Cow<'static, str>>,
    environment: Option<Cow<'static, str>>,
    resource_attributes: Vec<KeyValue>,
    span_exporter: Option<Box<dyn SpanExporter>>,
    batch_config: Option<BatchConfig>,
    sampler: Option<Box<dyn ShouldSample>>,
    metric_exporter: Option<Box<dyn MetricExporter>>,
    metric_interval: Option<Duration>,
    metric_timeout: Option<Duration>,
}

impl TelemetryProviderBuilder {
    /// Set the `service.name` resource attribute.
    pub fn with_service_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Set the `service.version` resource attribute.
    pub fn with_service_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    /// Set the `deployment.environment` resource attribute.
    pub fn with_environment(mut self, environment: impl Into<Cow<'static, str>>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Add extra resource attributes.
    pub fn with_resource_attributes(
        mut self,
        attributes: impl IntoIterator<Item = KeyValue>,
    ) -> Self {
        self.resource_attributes.extend(attributes);
        self
    }

    /// Set the span exporter fed by a batch processor. Required.
    pub fn with_span_exporter(mut self, exporter: impl SpanExporter + 'static) -> Self {
        self.span_exporter = Some(Box::new(exporter));
        self
    }

    /// Override the default batching configuration.
    pub fn with_batch_config(mut self, config: BatchConfig) -> Self {
        self.batch_config = Some(config);
        self
    }

    /// Replace the default parent-based/always-on sampler.
    pub fn with_sampler(mut self, sampler: impl ShouldSample + 'static) -> Self {
        self.sampler = Some(Box::new(sampler));
        self
    }

    /// Set the metric exporter driven by the periodic reader. Required.
    pub fn with_metric_exporter(mut self, exporter: impl MetricExporter + 'static) -> Self {
        self.metric_exporter = Some(Box::new(exporter));
        self
    }

    /// Override the default metric collection interval.
    pub fn with_metric_interval(mut self, interval: Duration) -> Self {
        self.metric_interval = Some(interval);
        self
    }

    /// Override the default metric flush and shutdown deadline.
    pub fn with_metric_timeout(mut self, timeout: Duration) -> Self {
        self.metric_timeout = Some(timeout);
        self
    }

    /// Validate the configuration and start the pipeline.
    ///
    /// Fails fast when either exporter is missing; no worker threads
    /// are spawned on the error path.
    pub fn build(self) -> Result<TelemetryProvider, Error> {
        let span_exporter = self.span_exporter.ok_or_else(|| {
            Error::Trace(TraceError::Other(
                "no span exporter configured".to_string(),
            ))
        })?;
        let metric_exporter = self.metric_exporter.ok_or_else(|| {
            Error::Metric(MetricError::Config(
                "no metric exporter configured".to_string(),
            ))
        })?;

        let mut resource = Resource::builder();
        if let Some(name) = self.service_name {
            resource = resource.with_service_name(name);
        }
        if let Some(version) = self.service_version {
            resource = resource.with_service_version(version);
        }
        if let Some(environment) = self.environment {
            resource = resource.with_environment(environment);
        }
        let resource = resource.with_attributes(self.resource_attributes).build();

        let processor = BatchSpanProcessor::new(
            span_exporter,
            self.batch_config.unwrap_or_default(),
        );
        let mut tracer_provider = TracerProvider::builder()
            .with_span_processor(processor)
            .with_resource(resource.clone());
        if let Some(sampler) = self.sampler {
            tracer_provider = tracer_provider.with_sampler(sampler);
        }
        let tracer_provider = tracer_provider.build();

        let registry = Arc::new(MetricRegistry::new());
        let mut reader = PeriodicReader::builder(metric_exporter);
        if let Some(interval) = self.metric_interval {
            reader = reader.with_interval(interval);
        }
        if let Some(timeout) = self.metric_timeout {
            reader = reader.with_timeout(timeout);
        }
        let reader = reader.build();
        reader.register(&registry, resource.clone());

        let propagator = CompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]);

        Ok(TelemetryProvider {
            tracer_provider,
            registry,
            reader,
            resource,
            propagator,
        })
    }
}
