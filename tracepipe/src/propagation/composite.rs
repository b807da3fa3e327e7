use crate::propagation::{Extractor, Injector, TextMapPropagator};
use crate::Context;

/// Runs several propagators as one.
///
/// Injection runs every propagator. On extraction the first propagator
/// that produces a valid span context wins; later propagators still
/// contribute their other fields (such as baggage) but cannot replace
/// an already-valid span context.
#[derive(Debug, Default)]
pub struct CompositePropagator {
    propagators: Vec<Box<dyn TextMapPropagator>>,
}

impl CompositePropagator {
    /// Combine `propagators` into one.
    pub fn new(propagators: Vec<Box<dyn TextMapPropagator>>) -> Self {
        CompositePropagator { propagators }
    }
}

impl TextMapPropagator for CompositePropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        for propagator in &self.propagators {
            propagator.inject_context(cx, injector);
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        let mut cx = cx.clone();
        for propagator in &self.propagators {
            let had_valid_span = cx.has_active_span();
            let previous_span = cx.span_context().cloned();
            cx = propagator.extract_with_context(&cx, extractor);
            if had_valid_span {
                if let Some(previous) = previous_span {
                    cx = cx.with_span_context(previous);
                }
            }
        }
        cx
    }

    fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        for propagator in &self.propagators {
            for field in propagator.fields() {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::{BaggagePropagator, TraceContextPropagator};
    use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
    use crate::Baggage;
    use std::collections::HashMap;

    fn composite() -> CompositePropagator {
        CompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ])
    }

    #[test]
    fn fields_are_deduplicated_union() {
        assert_eq!(
            composite().fields(),
            vec!["traceparent", "tracestate", "baggage"]
        );
    }

    #[test]
    fn inject_and_extract_both_concerns() {
        let propagator = composite();
        let span_context = SpanContext::new(
            TraceId::from(0xa1u128),
            SpanId::from(0xb2u64),
            TraceFlags::SAMPLED,
            false,
            TraceState::NONE,
        );
        let mut baggage = Baggage::new();
        baggage.insert("tenant", "acme");
        let cx = Context::new()
            .with_span_context(span_context)
            .with_baggage(baggage);

        let mut carrier = HashMap::new();
        propagator.inject_context(&cx, &mut carrier);
        assert!(Extractor::get(&carrier, "traceparent").is_some());
        assert!(Extractor::get(&carrier, "baggage").is_some());

        let extracted = propagator.extract(&carrier);
        assert_eq!(
            extracted.span_context().unwrap().trace_id(),
            TraceId::from(0xa1u128)
        );
        assert_eq!(extracted.baggage().get("tenant"), Some("acme"));
    }

    #[test]
    fn first_valid_span_context_wins() {
        // Two trace-context propagators stacked: the second sees a
        // context that already has a valid span and must not replace it.
        let propagator = CompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(TraceContextPropagator::new()),
        ]);
        let existing = SpanContext::new(
            TraceId::from(0x11u128),
            SpanId::from(0x22u64),
            TraceFlags::SAMPLED,
            true,
            TraceState::NONE,
        );
        let cx = Context::new().with_span_context(existing.clone());

        let mut carrier = HashMap::new();
        Injector::set(
            &mut carrier,
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
        );
        let extracted = propagator.extract_with_context(&cx, &carrier);
        assert_eq!(extracted.span_context(), Some(&existing));
    }
}
