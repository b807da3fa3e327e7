use std::fmt;

use futures_util::future::BoxFuture;

use crate::error::MetricResult;
use crate::metrics::data::ResourceMetrics;

/// Delivers one collection cycle's metrics to a backend.
///
/// `export` returns a future so that exporters may do async I/O; the
/// periodic reader drives it to completion on its worker thread.
pub trait MetricExporter: Send + Sync + fmt::Debug {
    /// Export one collection.
    fn export<'a>(&'a self, metrics: &'a ResourceMetrics) -> BoxFuture<'a, MetricResult<()>>;

    /// Release resources held by the exporter. Called at most once,
    /// after the final collection has been exported.
    fn shutdown(&self) {}
}

impl MetricExporter for Box<dyn MetricExporter> {
    fn export<'a>(&'a self, metrics: &'a ResourceMetrics) -> BoxFuture<'a, MetricResult<()>> {
        (**self).export(metrics)
    }

    fn shutdown(&self) {
        (**self).shutdown()
    }
}
