//! The span side of the pipeline: tracer, spans, sampling, batch
//! processing and export.

mod export;
mod id_generator;
mod in_memory_exporter;
mod provider;
mod sampler;
mod span;
mod span_context;
mod span_processor;
mod tracer;

pub use export::{ExportResult, SpanData, SpanExporter};
pub use id_generator::{IdGenerator, RandomIdGenerator, SequentialIdGenerator};
pub use in_memory_exporter::InMemorySpanExporter;
pub use provider::{TracerProvider, TracerProviderBuilder};
pub use sampler::{Sampler, SamplingDecision, ShouldSample};
pub use span::Span;
pub use span_context::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
pub use span_processor::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, SimpleSpanProcessor, SpanProcessor,
};
pub use tracer::{SpanBuilder, Tracer};

use std::borrow::Cow;
use std::time::SystemTime;

use crate::KeyValue;

/// The relationship a span has to the operation it describes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpanKind {
    /// An operation internal to the service.
    #[default]
    Internal,
    /// Handling a request from a remote client.
    Server,
    /// Issuing a request to a remote service.
    Client,
    /// Publishing a message to a broker.
    Producer,
    /// Processing a message from a broker.
    Consumer,
}

/// The outcome recorded on a span.
///
/// Once a span reaches `Ok` its status no longer changes; variant
/// order encodes that precedence.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    /// No status has been set.
    #[default]
    Unset,
    /// The operation failed.
    Error {
        /// Human readable failure detail.
        description: Cow<'static, str>,
    },
    /// The operation completed successfully.
    Ok,
}

impl Status {
    /// Construct an error status with the given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }
}

/// A timestamped annotation on a span.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// The event name.
    pub name: Cow<'static, str>,
    /// When the event occurred.
    pub timestamp: SystemTime,
    /// Attributes describing the event.
    pub attributes: Vec<KeyValue>,
}

impl Event {
    /// Create a new event.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) -> Self {
        Event {
            name: name.into(),
            timestamp,
            attributes,
        }
    }
}
