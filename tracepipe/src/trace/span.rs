use std::borrow::Cow;
use std::time::SystemTime;

use crate::trace::{Event, SpanContext, SpanData, Status, TracerProvider};
use crate::KeyValue;

/// A single operation in flight.
///
/// A recording span buffers everything written to it and hands the
/// finished [`SpanData`] to the pipeline's processors when it ends. A
/// non-recording span (sampled out, or created after shutdown) keeps
/// its identity for propagation but ignores all writes.
///
/// Ending is idempotent: only the first `end` call takes effect, and a
/// span that is still recording when dropped ends itself.
#[derive(Debug)]
pub struct Span {
    span_context: SpanContext,
    data: Option<SpanData>,
    provider: TracerProvider,
}

impl Span {
    pub(crate) fn new(
        span_context: SpanContext,
        data: Option<SpanData>,
        provider: TracerProvider,
    ) -> Self {
        Span {
            span_context,
            data,
            provider,
        }
    }

    /// The span's identity, valid whether or not it is recording.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Whether writes to this span are being recorded.
    pub fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    /// Set an attribute. A later write to the same key replaces the
    /// earlier value.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if let Some(data) = self.data.as_mut() {
            match data.attributes.iter_mut().find(|kv| kv.key == attribute.key) {
                Some(existing) => existing.value = attribute.value,
                None => data.attributes.push(attribute),
            }
        }
    }

    /// Set several attributes at once.
    pub fn set_attributes(&mut self, attributes: impl IntoIterator<Item = KeyValue>) {
        if self.data.is_some() {
            for attribute in attributes {
                self.set_attribute(attribute);
            }
        }
    }

    /// Add a timestamped event.
    pub fn add_event(&mut self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        self.add_event_with_timestamp(name, SystemTime::now(), attributes)
    }

    /// Add an event with an explicit timestamp.
    pub fn add_event_with_timestamp(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) {
        if let Some(data) = self.data.as_mut() {
            data.events.push(Event::new(name, timestamp, attributes));
        }
    }

    /// Replace the operation name.
    pub fn update_name(&mut self, name: impl Into<Cow<'static, str>>) {
        if let Some(data) = self.data.as_mut() {
            data.name = name.into();
        }
    }

    /// Set the span status. `Ok` wins over `Error`, which wins over
    /// `Unset`; a write of lower precedence is ignored.
    pub fn set_status(&mut self, status: Status) {
        if let Some(data) = self.data.as_mut() {
            if status > data.status {
                data.status = status;
            }
        }
    }

    /// Record an error as an `exception` event and mark the span's
    /// status as `Error` with the error's display text.
    pub fn record_error<E>(&mut self, err: &E)
    where
        E: std::error::Error + ?Sized,
    {
        if self.data.is_some() {
            let message = err.to_string();
            self.add_event(
                "exception",
                vec![
                    KeyValue::new("exception.message", message.clone()),
                    KeyValue::new("exception.type", std::any::type_name::<E>()),
                ],
            );
            self.set_status(Status::error(message));
        }
    }

    /// End the span now.
    pub fn end(&mut self) {
        self.end_with_timestamp(SystemTime::now());
    }

    /// End the span at an explicit timestamp. An end time earlier than
    /// the start time is clamped to the start time.
    pub fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        let Some(mut data) = self.data.take() else {
            return;
        };
        data.end_time = if timestamp < data.start_time {
            data.start_time
        } else {
            timestamp
        };
        let processors = self.provider.processors();
        if let Some((last, rest)) = processors.split_last() {
            for processor in rest {
                processor.on_end(data.clone());
            }
            last.on_end(data);
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if self.data.is_some() {
            self.end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemorySpanExporter, SimpleSpanProcessor, Tracer};
    use crate::{Context, Value};
    use std::time::Duration;

    fn test_pipeline() -> (InMemorySpanExporter, Tracer) {
        let exporter = InMemorySpanExporter::new();
        let provider = TracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(exporter.clone()))
            .build();
        (exporter, provider.tracer())
    }

    #[test]
    fn attribute_last_write_wins() {
        let (exporter, tracer) = test_pipeline();
        let (_cx, mut span) = tracer.start(&Context::new(), "op");
        span.set_attribute(KeyValue::new("retries", 1));
        span.set_attribute(KeyValue::new("retries", 2));
        span.end();

        let spans = exporter.finished_spans();
        assert_eq!(spans[0].attributes.len(), 1);
        assert_eq!(spans[0].attributes[0].value, Value::I64(2));
    }

    #[test]
    fn status_precedence_is_enforced() {
        let (exporter, tracer) = test_pipeline();
        let (_cx, mut span) = tracer.start(&Context::new(), "op");
        span.set_status(Status::error("first failure"));
        span.set_status(Status::Ok);
        span.set_status(Status::error("too late"));
        span.set_status(Status::Unset);
        span.end();

        assert_eq!(exporter.finished_spans()[0].status, Status::Ok);
    }

    #[test]
    fn end_is_idempotent() {
        let (exporter, tracer) = test_pipeline();
        let (_cx, mut span) = tracer.start(&Context::new(), "op");
        span.end();
        span.set_attribute(KeyValue::new("after", true));
        span.add_event("after", Vec::new());
        span.end();

        let spans = exporter.finished_spans();
        assert_eq!(spans.len(), 1);
        assert!(spans[0].attributes.is_empty());
        assert!(spans[0].events.is_empty());
    }

    #[test]
    fn drop_ends_recording_span() {
        let (exporter, tracer) = test_pipeline();
        {
            let (_cx, _span) = tracer.start(&Context::new(), "dropped");
        }
        assert_eq!(exporter.finished_spans().len(), 1);
        assert_eq!(exporter.finished_spans()[0].name, "dropped");
    }

    #[test]
    fn end_time_is_clamped_to_start_time() {
        let (exporter, tracer) = test_pipeline();
        let (_cx, mut span) = tracer.start(&Context::new(), "op");
        let before_start = SystemTime::now() - Duration::from_secs(3600);
        span.end_with_timestamp(before_start);

        let data = &exporter.finished_spans()[0];
        assert_eq!(data.end_time, data.start_time);
    }

    #[test]
    fn record_error_sets_event_and_status() {
        let (exporter, tracer) = test_pipeline();
        let (_cx, mut span) = tracer.start(&Context::new(), "op");
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        span.record_error(&err);
        span.end();

        let data = &exporter.finished_spans()[0];
        assert_eq!(data.events.len(), 1);
        assert_eq!(data.events[0].name, "exception");
        assert!(matches!(data.status, Status::Error { .. }));
    }
}
