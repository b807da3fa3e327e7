//! An explicit, immutable propagation context.
//!
//! `Context` is a small value passed by reference through call chains
//! and across threads by cloning. There is no implicit current context;
//! callers always say which context an operation belongs to.

use crate::baggage::Baggage;
use crate::trace::SpanContext;

/// An immutable bundle of the active span identity and baggage.
///
/// All `with_*` methods return a new `Context`, leaving the receiver
/// untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Context {
    span_context: Option<SpanContext>,
    baggage: Baggage,
}

impl Context {
    /// An empty root context.
    pub fn new() -> Self {
        Context::default()
    }

    /// A copy of this context with `span_context` as the active span.
    pub fn with_span_context(&self, span_context: SpanContext) -> Self {
        Context {
            span_context: Some(span_context),
            baggage: self.baggage.clone(),
        }
    }

    /// A copy of this context carrying a span context extracted from a
    /// remote peer.
    pub fn with_remote_span_context(&self, span_context: SpanContext) -> Self {
        self.with_span_context(span_context.with_remote(true))
    }

    /// The active span context, if one has been set.
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.span_context.as_ref()
    }

    /// Whether this context carries a valid active span.
    pub fn has_active_span(&self) -> bool {
        self.span_context.as_ref().is_some_and(|sc| sc.is_valid())
    }

    /// The baggage carried by this context.
    pub fn baggage(&self) -> &Baggage {
        &self.baggage
    }

    /// A copy of this context with its baggage replaced.
    pub fn with_baggage(&self, baggage: Baggage) -> Self {
        Context {
            span_context: self.span_context.clone(),
            baggage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanId, TraceFlags, TraceId, TraceState};

    fn sample_span_context() -> SpanContext {
        SpanContext::new(
            TraceId::from(0x1u128),
            SpanId::from(0x2u64),
            TraceFlags::SAMPLED,
            false,
            TraceState::NONE,
        )
    }

    #[test]
    fn with_span_context_does_not_mutate_original() {
        let root = Context::new();
        let child = root.with_span_context(sample_span_context());
        assert!(root.span_context().is_none());
        assert!(child.has_active_span());
    }

    #[test]
    fn remote_span_context_is_marked_remote() {
        let cx = Context::new().with_remote_span_context(sample_span_context());
        assert!(cx.span_context().unwrap().is_remote());
    }

    #[test]
    fn invalid_span_context_is_not_active() {
        let cx = Context::new().with_span_context(SpanContext::NONE);
        assert!(cx.span_context().is_some());
        assert!(!cx.has_active_span());
    }

    #[test]
    fn baggage_survives_span_updates() {
        let mut baggage = Baggage::new();
        baggage.insert("tenant", "acme");
        let cx = Context::new().with_baggage(baggage);
        let child = cx.with_span_context(sample_span_context());
        assert_eq!(child.baggage().get("tenant"), Some("acme"));
    }
}
