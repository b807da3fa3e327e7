//! Log emission with trace correlation.
//!
//! Handlers are capability objects composed by explicit decoration:
//! wrap any [`LogHandler`] in a [`TraceCorrelationHandler`] and every
//! record emitted under a context with a valid span gains `trace_id`
//! and `span_id` attributes before reaching the wrapped handler.

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::{Context, Key, KeyValue};

/// Attribute key carrying the correlated trace id.
pub const TRACE_ID_KEY: Key = Key::from_static_str("trace_id");
/// Attribute key carrying the correlated span id.
pub const SPAN_ID_KEY: Key = Key::from_static_str("span_id");

/// The severity of a log record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Fine-grained diagnostic detail.
    Debug,
    /// Normal operational messages.
    Info,
    /// Something unexpected but recoverable.
    Warn,
    /// A failure.
    Error,
}

impl Severity {
    /// The severity as its conventional uppercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

/// One log record.
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    /// When the record was created.
    pub timestamp: SystemTime,
    /// The record severity.
    pub severity: Severity,
    /// The log message.
    pub body: Cow<'static, str>,
    /// Attributes attached to this record.
    pub attributes: Vec<KeyValue>,
}

impl LogRecord {
    /// Create a record timestamped now.
    pub fn new(severity: Severity, body: impl Into<Cow<'static, str>>) -> Self {
        LogRecord {
            timestamp: SystemTime::now(),
            severity,
            body: body.into(),
            attributes: Vec::new(),
        }
    }

    /// Attach attributes to the record.
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        self.attributes.extend(attributes);
        self
    }
}

/// A destination for log records.
///
/// `with_attributes` and `with_group` return new handlers rather than
/// mutating, so derived handlers can be fanned out freely.
pub trait LogHandler: Send + Sync + fmt::Debug {
    /// Emit one record under `cx`.
    fn handle(&self, cx: &Context, record: LogRecord);

    /// A handler that attaches `attributes` to every record it emits.
    fn with_attributes(&self, attributes: Vec<KeyValue>) -> Box<dyn LogHandler>;

    /// A handler that prefixes the keys of record attributes with
    /// `name.`, scoping them under a group.
    fn with_group(&self, name: &str) -> Box<dyn LogHandler>;
}

/// Decorates another handler with trace correlation: records emitted
/// under a context whose span is valid gain `trace_id` and `span_id`
/// attributes.
#[derive(Debug)]
pub struct TraceCorrelationHandler {
    inner: Box<dyn LogHandler>,
}

impl TraceCorrelationHandler {
    /// Wrap `inner`.
    pub fn new(inner: Box<dyn LogHandler>) -> Self {
        TraceCorrelationHandler { inner }
    }
}

impl LogHandler for TraceCorrelationHandler {
    fn handle(&self, cx: &Context, mut record: LogRecord) {
        if let Some(span_context) = cx.span_context().filter(|sc| sc.is_valid()) {
            record.attributes.push(KeyValue::new(
                TRACE_ID_KEY,
                span_context.trace_id().to_string(),
            ));
            record.attributes.push(KeyValue::new(
                SPAN_ID_KEY,
                span_context.span_id().to_string(),
            ));
        }
        self.inner.handle(cx, record);
    }

    fn with_attributes(&self, attributes: Vec<KeyValue>) -> Box<dyn LogHandler> {
        Box::new(TraceCorrelationHandler {
            inner: self.inner.with_attributes(attributes),
        })
    }

    fn with_group(&self, name: &str) -> Box<dyn LogHandler> {
        Box::new(TraceCorrelationHandler {
            inner: self.inner.with_group(name),
        })
    }
}

/// A terminal handler that buffers records in memory, used in tests to
/// assert on exactly what was emitted.
///
/// Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLogHandler {
    records: Arc<Mutex<Vec<LogRecord>>>,
    base_attributes: Vec<KeyValue>,
    group: Option<String>,
}

impl InMemoryLogHandler {
    /// Create a handler with an empty buffer.
    pub fn new() -> Self {
        InMemoryLogHandler::default()
    }

    /// A snapshot of every record handled so far.
    pub fn emitted_records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl LogHandler for InMemoryLogHandler {
    fn handle(&self, _cx: &Context, mut record: LogRecord) {
        if let Some(group) = &self.group {
            for attribute in &mut record.attributes {
                attribute.key = Key::new(format!("{group}.{}", attribute.key));
            }
        }
        record.attributes.extend(self.base_attributes.clone());
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    fn with_attributes(&self, attributes: Vec<KeyValue>) -> Box<dyn LogHandler> {
        let mut handler = self.clone();
        handler.base_attributes.extend(attributes);
        Box::new(handler)
    }

    fn with_group(&self, name: &str) -> Box<dyn LogHandler> {
        let mut handler = self.clone();
        handler.group = Some(match &self.group {
            Some(group) => format!("{group}.{name}"),
            None => name.to_string(),
        });
        Box::new(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
    use crate::Value;

    fn span_cx() -> Context {
        Context::new().with_span_context(SpanContext::new(
            TraceId::from(0xabcdefu128),
            SpanId::from(0x1234u64),
            TraceFlags::SAMPLED,
            false,
            TraceState::NONE,
        ))
    }

    fn attribute<'a>(record: &'a LogRecord, key: &Key) -> Option<&'a Value> {
        record
            .attributes
            .iter()
            .find(|kv| kv.key == *key)
            .map(|kv| &kv.value)
    }

    #[test]
    fn correlation_adds_ids_when_span_is_valid() {
        let sink = InMemoryLogHandler::new();
        let handler = TraceCorrelationHandler::new(Box::new(sink.clone()));
        handler.handle(&span_cx(), LogRecord::new(Severity::Info, "hello"));

        let records = sink.emitted_records();
        assert_eq!(
            attribute(&records[0], &TRACE_ID_KEY),
            Some(&Value::from("00000000000000000000000000abcdef".to_string()))
        );
        assert_eq!(
            attribute(&records[0], &SPAN_ID_KEY),
            Some(&Value::from("0000000000001234".to_string()))
        );
    }

    #[test]
    fn correlation_skips_records_without_a_span() {
        let sink = InMemoryLogHandler::new();
        let handler = TraceCorrelationHandler::new(Box::new(sink.clone()));
        handler.handle(&Context::new(), LogRecord::new(Severity::Warn, "orphan"));
        handler.handle(
            &Context::new().with_span_context(SpanContext::NONE),
            LogRecord::new(Severity::Warn, "invalid"),
        );

        for record in sink.emitted_records() {
            assert!(attribute(&record, &TRACE_ID_KEY).is_none());
            assert!(attribute(&record, &SPAN_ID_KEY).is_none());
        }
    }

    #[test]
    fn derived_handlers_keep_correlation() {
        let sink = InMemoryLogHandler::new();
        let handler = TraceCorrelationHandler::new(Box::new(sink.clone()));
        let derived = handler
            .with_attributes(vec![KeyValue::new("component", "payments")])
            .with_group("request");
        derived.handle(
            &span_cx(),
            LogRecord::new(Severity::Info, "charged")
                .with_attributes([KeyValue::new("amount", 42)]),
        );

        let records = sink.emitted_records();
        // Record attributes (correlation ids included) are grouped,
        // handler base attributes are not.
        assert!(attribute(&records[0], &Key::new("request.amount")).is_some());
        assert!(attribute(&records[0], &Key::new("request.trace_id")).is_some());
        assert!(attribute(&records[0], &Key::new("component")).is_some());
    }

    #[test]
    fn severity_names() {
        assert_eq!(Severity::Debug.as_str(), "DEBUG");
        assert_eq!(Severity::Error.as_str(), "ERROR");
        assert!(Severity::Debug < Severity::Error);
    }
}
