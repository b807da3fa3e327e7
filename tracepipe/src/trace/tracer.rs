use std::borrow::Cow;
use std::time::SystemTime;

use crate::trace::{
    Sampler, SamplingDecision, Span, SpanContext, SpanData, SpanId, SpanKind, Status, TraceFlags,
    TracerProvider,
};
use crate::{Context, KeyValue};

/// Creates spans for a [`TracerProvider`].
///
/// Parenthood is explicit: every start takes the parent [`Context`] and
/// returns the child context alongside the span, so instrumentation
/// threads the context through its own call chain.
#[derive(Clone, Debug)]
pub struct Tracer {
    provider: TracerProvider,
}

impl Tracer {
    pub(crate) fn new(provider: TracerProvider) -> Self {
        Tracer { provider }
    }

    /// Start a span as a child of whatever span is active in `parent`,
    /// or as a root span when none is.
    pub fn start(&self, parent: &Context, name: impl Into<Cow<'static, str>>) -> (Context, Span) {
        SpanBuilder::new(name).start(self, parent)
    }

    fn build(&self, builder: SpanBuilder, parent: &Context) -> (Context, Span) {
        let provider = &self.provider;
        if provider.is_shutdown() {
            return (
                parent.clone(),
                Span::new(SpanContext::NONE, None, provider.clone()),
            );
        }

        let parent_span = parent.span_context().filter(|sc| sc.is_valid());
        let (trace_id, parent_span_id, trace_state) = match parent_span {
            Some(sc) => (sc.trace_id(), sc.span_id(), sc.trace_state().clone()),
            None => (
                provider.id_generator().new_trace_id(),
                SpanId::INVALID,
                Default::default(),
            ),
        };
        let span_id = provider.id_generator().new_span_id();

        let sampled = provider
            .sampler()
            .should_sample(parent_span, trace_id, &builder.name)
            == SamplingDecision::RecordAndSample;

        let span_context = SpanContext::new(
            trace_id,
            span_id,
            TraceFlags::default().with_sampled(sampled),
            false,
            trace_state,
        );
        let child_cx = parent.with_span_context(span_context.clone());

        let data = sampled.then(|| {
            let start_time = builder.start_time.unwrap_or_else(SystemTime::now);
            SpanData {
                span_context: span_context.clone(),
                parent_span_id,
                span_kind: builder.kind,
                name: builder.name,
                start_time,
                end_time: start_time,
                attributes: builder.attributes,
                events: Vec::new(),
                status: Status::Unset,
            }
        });

        (child_cx, Span::new(span_context, data, provider.clone()))
    }
}

/// Assembles the optional fields of a span before it starts.
#[derive(Debug)]
pub struct SpanBuilder {
    name: Cow<'static, str>,
    kind: SpanKind,
    attributes: Vec<KeyValue>,
    start_time: Option<SystemTime>,
}

impl SpanBuilder {
    /// Create a builder for a span named `name`.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        SpanBuilder {
            name: name.into(),
            kind: SpanKind::default(),
            attributes: Vec::new(),
            start_time: None,
        }
    }

    /// Set the span kind.
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attach attributes known at start time.
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Use an explicit start timestamp instead of now.
    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Start the span under `parent` using `tracer`.
    pub fn start(self, tracer: &Tracer, parent: &Context) -> (Context, Span) {
        tracer.build(self, parent)
    }
}

// Convenience so provider internals can ask "what would the default
// sampler do" without building a span.
pub(crate) fn default_sampler() -> Sampler {
    Sampler::ParentBased(Box::new(Sampler::AlwaysOn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemorySpanExporter, SequentialIdGenerator, SimpleSpanProcessor};

    fn test_provider(sampler: Sampler) -> (InMemorySpanExporter, TracerProvider) {
        let exporter = InMemorySpanExporter::new();
        let provider = TracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(exporter.clone()))
            .with_sampler(sampler)
            .with_id_generator(SequentialIdGenerator::default())
            .build();
        (exporter, provider)
    }

    #[test]
    fn child_inherits_trace_id_and_parent_span_id() {
        let (exporter, provider) = test_provider(Sampler::AlwaysOn);
        let tracer = provider.tracer();

        let root_cx = Context::new();
        let (parent_cx, mut parent) = tracer.start(&root_cx, "parent");
        let (_child_cx, mut child) = tracer.start(&parent_cx, "child");
        let parent_context = parent.span_context().clone();
        child.end();
        parent.end();

        let spans = exporter.finished_spans();
        let child_data = spans.iter().find(|s| s.name == "child").unwrap();
        assert_eq!(
            child_data.span_context.trace_id(),
            parent_context.trace_id()
        );
        assert_eq!(child_data.parent_span_id, parent_context.span_id());
        assert_ne!(child_data.span_context.span_id(), parent_context.span_id());
    }

    #[test]
    fn root_span_has_invalid_parent_id() {
        let (exporter, provider) = test_provider(Sampler::AlwaysOn);
        let (_cx, mut span) = provider.tracer().start(&Context::new(), "root");
        span.end();
        assert_eq!(
            exporter.finished_spans()[0].parent_span_id,
            SpanId::INVALID
        );
    }

    #[test]
    fn sampled_out_spans_keep_identity_but_record_nothing() {
        let (exporter, provider) = test_provider(Sampler::AlwaysOff);
        let tracer = provider.tracer();
        let (child_cx, mut span) = tracer.start(&Context::new(), "quiet");

        assert!(!span.is_recording());
        assert!(span.span_context().is_valid());
        assert!(!span.span_context().is_sampled());
        // The identity still propagates to children through the context.
        assert!(child_cx.has_active_span());

        span.set_attribute(KeyValue::new("ignored", true));
        span.end();
        assert!(exporter.finished_spans().is_empty());
    }

    #[test]
    fn builder_attributes_and_kind_are_recorded() {
        let (exporter, provider) = test_provider(Sampler::AlwaysOn);
        let (_cx, mut span) = SpanBuilder::new("fetch")
            .with_kind(SpanKind::Client)
            .with_attributes([KeyValue::new("peer.service", "billing")])
            .start(&provider.tracer(), &Context::new());
        span.end();

        let data = &exporter.finished_spans()[0];
        assert_eq!(data.span_kind, SpanKind::Client);
        assert_eq!(data.attributes.len(), 1);
    }

    #[test]
    fn remote_parent_continues_the_trace() {
        let (exporter, provider) = test_provider(Sampler::ParentBased(Box::new(
            Sampler::AlwaysOff,
        )));
        let remote = SpanContext::new(
            crate::trace::TraceId::from(0xabcdu128),
            SpanId::from(0x99u64),
            TraceFlags::SAMPLED,
            true,
            Default::default(),
        );
        let cx = Context::new().with_remote_span_context(remote);
        let (_cx, mut span) = provider.tracer().start(&cx, "continued");
        span.end();

        let data = &exporter.finished_spans()[0];
        assert_eq!(
            data.span_context.trace_id(),
            crate::trace::TraceId::from(0xabcdu128)
        );
        assert_eq!(data.parent_span_id, SpanId::from(0x99u64));
        assert!(data.span_context.is_sampled());
    }

    #[test]
    fn shutdown_provider_hands_out_noop_spans() {
        let (exporter, provider) = test_provider(Sampler::AlwaysOn);
        provider
            .shutdown_with_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        let (_cx, mut span) = provider.tracer().start(&Context::new(), "too-late");
        assert!(!span.is_recording());
        span.end();
        assert!(exporter.finished_spans().is_empty());
    }
}
