use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::trace::{ExportResult, SpanData, SpanExporter};
use crate::Resource;

/// An exporter that buffers finished spans in memory, used in tests to
/// assert on exactly what reached the end of the pipeline.
///
/// Clones share the same buffer, so a test can keep one clone and hand
/// the other to the pipeline.
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
    resource: Arc<Mutex<Resource>>,
}

impl InMemorySpanExporter {
    /// Create a new exporter with an empty buffer.
    pub fn new() -> Self {
        InMemorySpanExporter {
            spans: Arc::new(Mutex::new(Vec::new())),
            resource: Arc::new(Mutex::new(Resource::empty())),
        }
    }

    /// A snapshot of every span exported so far.
    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// The resource the pipeline attached to this exporter.
    pub fn resource(&self) -> Resource {
        self.resource
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|_| Resource::empty())
    }

    /// Clear the buffer.
    pub fn reset(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        if let Ok(mut spans) = self.spans.lock() {
            spans.extend(batch);
        }
        async { Ok(()) }.boxed()
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut guard) = self.resource.lock() {
            *guard = resource.clone();
        }
    }
}
