//! W3C-style `traceparent`/`tracestate` propagation.

use crate::propagation::{Extractor, Injector, TextMapPropagator};
use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
use crate::Context;

const SUPPORTED_VERSION: u8 = 0;
const MAX_VERSION: u8 = 254;
const TRACEPARENT_HEADER: &str = "traceparent";
const TRACESTATE_HEADER: &str = "tracestate";

/// Propagates span identity through the `traceparent` header
/// (`{version:02x}-{trace_id:032x}-{span_id:016x}-{flags:02x}`) and
/// vendor state through `tracestate`.
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// Create a new propagator.
    pub fn new() -> Self {
        TraceContextPropagator::default()
    }

    fn extract_span_context(&self, extractor: &dyn Extractor) -> Result<SpanContext, ()> {
        let header_value = extractor.get(TRACEPARENT_HEADER).map(str::trim).ok_or(())?;
        let parts = header_value.split_terminator('-').collect::<Vec<&str>>();
        // Ensure parts are not out of range.
        if parts.len() < 4 {
            return Err(());
        }

        // Ensure version is within range, for version 0 there must be 4 parts.
        if parts[0].len() != 2 {
            return Err(());
        }
        let version = u8::from_str_radix(parts[0], 16).map_err(|_| ())?;
        if version > MAX_VERSION || version == 0 && parts.len() != 4 {
            return Err(());
        }

        // Ensure lengths are correct and in lowercase hex.
        if parts[1].len() != 32 || parts[2].len() != 16 || parts[3].len() != 2 {
            return Err(());
        }
        if parts
            .iter()
            .any(|part| part.chars().any(|c| c.is_ascii_uppercase()))
        {
            return Err(());
        }

        // Parse identifiers; zero values are rejected below by the
        // validity check.
        let trace_id = TraceId::from_hex(parts[1]).map_err(|_| ())?;
        let span_id = SpanId::from_hex(parts[2]).map_err(|_| ())?;

        // Parse flags; in version 0 only the low two bits may be set.
        let opts = u8::from_str_radix(parts[3], 16).map_err(|_| ())?;
        if version == 0 && opts > 2 {
            return Err(());
        }
        let trace_flags = TraceFlags::new(opts) & TraceFlags::SAMPLED;

        let trace_state = match extractor.get(TRACESTATE_HEADER) {
            Some(header) => TraceState::from_header(header),
            None => TraceState::NONE,
        };

        let span_context = SpanContext::new(trace_id, span_id, trace_flags, true, trace_state);
        if span_context.is_valid() {
            Ok(span_context)
        } else {
            Err(())
        }
    }
}

impl TextMapPropagator for TraceContextPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let Some(span_context) = cx.span_context().filter(|sc| sc.is_valid()) else {
            return;
        };
        let header_value = format!(
            "{:02x}-{}-{}-{:02x}",
            SUPPORTED_VERSION,
            span_context.trace_id(),
            span_context.span_id(),
            span_context.trace_flags() & TraceFlags::SAMPLED,
        );
        injector.set(TRACEPARENT_HEADER, header_value);
        if !span_context.trace_state().is_empty() {
            injector.set(
                TRACESTATE_HEADER,
                span_context.trace_state().header().to_string(),
            );
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        match self.extract_span_context(extractor) {
            Ok(remote) => cx.with_remote_span_context(remote),
            Err(()) => cx.clone(),
        }
    }

    fn fields(&self) -> Vec<&'static str> {
        vec![TRACEPARENT_HEADER, TRACESTATE_HEADER]
    }
}
