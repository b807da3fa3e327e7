use std::borrow::Cow;
use std::fmt;
use std::time::SystemTime;

use futures_util::future::BoxFuture;

use crate::error::TraceResult;
use crate::trace::{Event, SpanContext, SpanId, SpanKind, Status};
use crate::{KeyValue, Resource};

/// The outcome of exporting a batch of spans.
pub type ExportResult = TraceResult<()>;

/// Everything recorded on a finished span, handed to processors and
/// exporters.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// The span's identity.
    pub span_context: SpanContext,
    /// The parent's span id, or [`SpanId::INVALID`] for root spans.
    pub parent_span_id: SpanId,
    /// The span kind.
    pub span_kind: SpanKind,
    /// The operation name.
    pub name: Cow<'static, str>,
    /// When the operation started.
    pub start_time: SystemTime,
    /// When the operation ended. Never earlier than `start_time`.
    pub end_time: SystemTime,
    /// Attributes recorded on the span, last write per key retained.
    pub attributes: Vec<KeyValue>,
    /// Events in the order they were added.
    pub events: Vec<Event>,
    /// The final status.
    pub status: Status,
}

/// Delivers batches of finished spans to a backend.
///
/// `export` returns a future so that exporters may do async I/O; the
/// batch processor drives it to completion on its worker thread.
pub trait SpanExporter: Send + Sync + fmt::Debug {
    /// Export a batch of spans. Implementations should not retry
    /// internally without bound; the processor treats any `Err` as the
    /// batch being dropped.
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult>;

    /// Release resources held by the exporter. Called at most once,
    /// after the final batch has been exported.
    fn shutdown(&mut self) {}

    /// Receives the pipeline resource before the first export.
    fn set_resource(&mut self, _resource: &Resource) {}
}

impl SpanExporter for Box<dyn SpanExporter> {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        (**self).export(batch)
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }

    fn set_resource(&mut self, resource: &Resource) {
        (**self).set_resource(resource)
    }
}
