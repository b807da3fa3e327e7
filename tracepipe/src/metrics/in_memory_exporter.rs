use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::error::MetricResult;
use crate::metrics::data::ResourceMetrics;
use crate::metrics::MetricExporter;

/// An exporter that buffers each collection in memory, used in tests to
/// assert on exactly what the reader exported.
///
/// Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMetricExporter {
    exports: Arc<Mutex<Vec<ResourceMetrics>>>,
}

impl InMemoryMetricExporter {
    /// Create a new exporter with an empty buffer.
    pub fn new() -> Self {
        InMemoryMetricExporter::default()
    }

    /// A snapshot of every collection exported so far, oldest first.
    pub fn exported_metrics(&self) -> Vec<ResourceMetrics> {
        self.exports.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Clear the buffer.
    pub fn reset(&self) {
        if let Ok(mut exports) = self.exports.lock() {
            exports.clear();
        }
    }
}

impl MetricExporter for InMemoryMetricExporter {
    fn export<'a>(&'a self, metrics: &'a ResourceMetrics) -> BoxFuture<'a, MetricResult<()>> {
        if let Ok(mut exports) = self.exports.lock() {
            exports.push(metrics.clone());
        }
        async { Ok(()) }.boxed()
    }
}
