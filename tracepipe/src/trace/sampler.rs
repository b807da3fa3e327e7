use std::fmt;

use crate::trace::{SpanContext, TraceId};

/// The verdict a sampler returns for a prospective span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplingDecision {
    /// The span is neither recorded nor exported.
    Drop,
    /// The span is recorded and exported.
    RecordAndSample,
}

/// Decides, at span creation time, whether a span is recorded.
pub trait ShouldSample: Send + Sync + fmt::Debug {
    /// Return the sampling decision for a span about to be created.
    fn should_sample(
        &self,
        parent_context: Option<&SpanContext>,
        trace_id: TraceId,
        name: &str,
    ) -> SamplingDecision;
}

impl ShouldSample for Box<dyn ShouldSample> {
    fn should_sample(
        &self,
        parent_context: Option<&SpanContext>,
        trace_id: TraceId,
        name: &str,
    ) -> SamplingDecision {
        (**self).should_sample(parent_context, trace_id, name)
    }
}

/// The built-in sampling strategies.
#[derive(Clone, Debug)]
pub enum Sampler {
    /// Sample every span.
    AlwaysOn,
    /// Sample no spans.
    AlwaysOff,
    /// Follow the parent's sampled flag when a valid parent exists,
    /// otherwise delegate to the wrapped sampler.
    ParentBased(Box<Sampler>),
    /// Sample the given fraction of traces, decided deterministically
    /// from the low 64 bits of the trace id so every span in a trace
    /// gets the same verdict.
    TraceIdRatioBased(f64),
}

impl ShouldSample for Sampler {
    fn should_sample(
        &self,
        parent_context: Option<&SpanContext>,
        trace_id: TraceId,
        name: &str,
    ) -> SamplingDecision {
        match self {
            Sampler::AlwaysOn => SamplingDecision::RecordAndSample,
            Sampler::AlwaysOff => SamplingDecision::Drop,
            Sampler::ParentBased(delegate) => match parent_context.filter(|sc| sc.is_valid()) {
                Some(parent) if parent.is_sampled() => SamplingDecision::RecordAndSample,
                Some(_) => SamplingDecision::Drop,
                None => delegate.should_sample(None, trace_id, name),
            },
            Sampler::TraceIdRatioBased(fraction) => {
                if sample_from_trace_id(*fraction, trace_id) {
                    SamplingDecision::RecordAndSample
                } else {
                    SamplingDecision::Drop
                }
            }
        }
    }
}

fn sample_from_trace_id(fraction: f64, trace_id: TraceId) -> bool {
    if fraction >= 1.0 {
        return true;
    }
    if fraction <= 0.0 {
        return false;
    }
    let bytes = trace_id.to_bytes();
    let low = u64::from_be_bytes([
        bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    ]);
    low < (fraction * (u64::MAX as f64)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::id_generator::IdGenerator;
    use crate::trace::{SpanId, TraceFlags, TraceState};

    fn parent(sampled: bool) -> SpanContext {
        SpanContext::new(
            TraceId::from(1u128),
            SpanId::from(1u64),
            TraceFlags::default().with_sampled(sampled),
            true,
            TraceState::NONE,
        )
    }

    #[test]
    fn always_on_and_off() {
        let id = TraceId::from(7u128);
        assert_eq!(
            Sampler::AlwaysOn.should_sample(None, id, "op"),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(
            Sampler::AlwaysOff.should_sample(None, id, "op"),
            SamplingDecision::Drop
        );
    }

    #[test]
    fn parent_based_follows_parent() {
        let sampler = Sampler::ParentBased(Box::new(Sampler::AlwaysOff));
        let id = TraceId::from(7u128);
        assert_eq!(
            sampler.should_sample(Some(&parent(true)), id, "op"),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(
            sampler.should_sample(Some(&parent(false)), id, "op"),
            SamplingDecision::Drop
        );
        // No parent: delegate decides.
        assert_eq!(
            sampler.should_sample(None, id, "op"),
            SamplingDecision::Drop
        );
        // Invalid parent counts as no parent.
        assert_eq!(
            sampler.should_sample(Some(&SpanContext::NONE), id, "op"),
            SamplingDecision::Drop
        );
    }

    #[test]
    fn ratio_bounds() {
        let id = TraceId::from(u128::MAX);
        assert_eq!(
            Sampler::TraceIdRatioBased(1.0).should_sample(None, id, "op"),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(
            Sampler::TraceIdRatioBased(0.0).should_sample(None, id, "op"),
            SamplingDecision::Drop
        );
    }

    #[test]
    fn ratio_is_deterministic_per_trace() {
        let sampler = Sampler::TraceIdRatioBased(0.5);
        for seed in 0..32u128 {
            let id = TraceId::from(seed.wrapping_mul(0x9e37_79b9_7f4a_7c15));
            let first = sampler.should_sample(None, id, "op");
            let second = sampler.should_sample(None, id, "op");
            assert_eq!(first, second);
        }
    }

    #[test]
    fn ratio_roughly_matches_fraction() {
        let sampler = Sampler::TraceIdRatioBased(0.25);
        let generator = crate::trace::RandomIdGenerator::default();
        let sampled = (0..4000)
            .filter(|_| {
                sampler.should_sample(None, generator.new_trace_id(), "op")
                    == SamplingDecision::RecordAndSample
            })
            .count();
        // 4000 draws at p=0.25; allow a generous band around 1000.
        assert!((700..1300).contains(&sampled), "sampled {sampled} of 4000");
    }
}
