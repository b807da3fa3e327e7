use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::TraceResult;
use crate::trace::span_processor::SpanProcessor;
use crate::trace::tracer::default_sampler;
use crate::trace::{
    BatchConfig, BatchSpanProcessor, IdGenerator, RandomIdGenerator, ShouldSample,
    SimpleSpanProcessor, SpanExporter, Tracer,
};
use crate::Resource;

/// Owns the span pipeline: processors, sampler, id generator and
/// resource.
///
/// Cheap to clone; all clones share the same pipeline. After shutdown
/// the provider hands out non-recording spans.
#[derive(Clone, Debug)]
pub struct TracerProvider {
    inner: Arc<TracerProviderInner>,
}

#[derive(Debug)]
struct TracerProviderInner {
    processors: Vec<Box<dyn SpanProcessor>>,
    sampler: Box<dyn ShouldSample>,
    id_generator: Box<dyn IdGenerator>,
    resource: Resource,
    is_shutdown: AtomicBool,
}

impl TracerProvider {
    /// Start building a provider.
    pub fn builder() -> TracerProviderBuilder {
        TracerProviderBuilder::default()
    }

    /// A tracer creating spans through this provider.
    pub fn tracer(&self) -> Tracer {
        Tracer::new(self.clone())
    }

    /// The resource attached to exported spans.
    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    /// Whether shutdown has begun.
    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::Relaxed)
    }

    /// Flush every processor, returning the first error observed after
    /// all have been asked.
    pub fn force_flush(&self) -> TraceResult<()> {
        let mut result = Ok(());
        for processor in &self.inner.processors {
            if let Err(err) = processor.force_flush() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Stop accepting spans, flush and shut down every processor.
    ///
    /// All processors are shut down even when an earlier one fails; the
    /// first error observed is returned.
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> TraceResult<()> {
        self.inner.is_shutdown.store(true, Ordering::Relaxed);
        let mut result = Ok(());
        for processor in &self.inner.processors {
            if let Err(err) = processor.shutdown_with_timeout(timeout) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    pub(crate) fn processors(&self) -> &[Box<dyn SpanProcessor>] {
        &self.inner.processors
    }

    pub(crate) fn sampler(&self) -> &dyn ShouldSample {
        self.inner.sampler.as_ref()
    }

    pub(crate) fn id_generator(&self) -> &dyn IdGenerator {
        self.inner.id_generator.as_ref()
    }
}

/// Builder for [`TracerProvider`].
#[derive(Debug)]
pub struct TracerProviderBuilder {
    processors: Vec<Box<dyn SpanProcessor>>,
    sampler: Box<dyn ShouldSample>,
    id_generator: Box<dyn IdGenerator>,
    resource: Resource,
}

impl Default for TracerProviderBuilder {
    fn default() -> Self {
        TracerProviderBuilder {
            processors: Vec::new(),
            sampler: Box::new(default_sampler()),
            id_generator: Box::new(RandomIdGenerator::default()),
            resource: Resource::default(),
        }
    }
}

impl TracerProviderBuilder {
    /// Add a span processor. Processors are notified of every finished
    /// span in registration order.
    pub fn with_span_processor(mut self, processor: impl SpanProcessor + 'static) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Add a [`BatchSpanProcessor`] with default configuration wrapping
    /// `exporter`.
    pub fn with_batch_exporter(self, exporter: impl SpanExporter + 'static) -> Self {
        self.with_span_processor(BatchSpanProcessor::new(exporter, BatchConfig::default()))
    }

    /// Add a [`SimpleSpanProcessor`] wrapping `exporter`.
    pub fn with_simple_exporter(self, exporter: impl SpanExporter + 'static) -> Self {
        self.with_span_processor(SimpleSpanProcessor::new(exporter))
    }

    /// Replace the default parent-based/always-on sampler.
    pub fn with_sampler(mut self, sampler: impl ShouldSample + 'static) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// Replace the default random id generator.
    pub fn with_id_generator(mut self, id_generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// Attach a resource describing the producing entity.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = resource;
        self
    }

    /// Build the provider, handing the resource to every processor.
    pub fn build(mut self) -> TracerProvider {
        for processor in &mut self.processors {
            processor.set_resource(&self.resource);
        }
        TracerProvider {
            inner: Arc::new(TracerProviderInner {
                processors: self.processors,
                sampler: self.sampler,
                id_generator: self.id_generator,
                resource: self.resource,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}
