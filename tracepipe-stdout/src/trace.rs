use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::json;
use tracepipe::trace::{ExportResult, SpanData, Status};
use tracepipe::{Resource, TraceError};

use crate::common::{attributes_json, resource_json, unix_nanos};

/// Writes each finished span as one JSON line on stdout.
#[derive(Debug, Default)]
pub struct SpanExporter {
    resource: Arc<Mutex<Resource>>,
    is_shutdown: AtomicBool,
}

impl SpanExporter {
    /// Create a new exporter.
    pub fn new() -> Self {
        SpanExporter::default()
    }

    fn span_json(&self, span: &SpanData, resource: &Resource) -> serde_json::Value {
        let (status, status_description) = match &span.status {
            Status::Unset => ("unset", None),
            Status::Ok => ("ok", None),
            Status::Error { description } => ("error", Some(description.as_ref())),
        };
        json!({
            "kind": "span",
            "name": span.name.as_ref(),
            "trace_id": span.span_context.trace_id().to_string(),
            "span_id": span.span_context.span_id().to_string(),
            "parent_span_id": span.parent_span_id.to_string(),
            "sampled": span.span_context.is_sampled(),
            "span_kind": format!("{:?}", span.span_kind),
            "start_time_unix_nano": unix_nanos(span.start_time).to_string(),
            "end_time_unix_nano": unix_nanos(span.end_time).to_string(),
            "status": status,
            "status_description": status_description,
            "attributes": attributes_json(&span.attributes),
            "events": span.events.iter().map(|event| json!({
                "name": event.name.as_ref(),
                "time_unix_nano": unix_nanos(event.timestamp).to_string(),
                "attributes": attributes_json(&event.attributes),
            })).collect::<Vec<_>>(),
            "resource": resource_json(resource),
        })
    }
}

impl tracepipe::trace::SpanExporter for SpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return async { Err(TraceError::AlreadyShutdown) }.boxed();
        }
        let resource = self
            .resource
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|_| Resource::empty());
        for span in &batch {
            println!("{}", self.span_json(span, &resource));
        }
        async { Ok(()) }.boxed()
    }

    fn shutdown(&mut self) {
        self.is_shutdown.store(true, Ordering::Relaxed);
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut guard) = self.resource.lock() {
            *guard = resource.clone();
        }
    }
}
