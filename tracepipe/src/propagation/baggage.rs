//! `baggage` header propagation.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::baggage::Baggage;
use crate::propagation::{Extractor, Injector, TextMapPropagator};
use crate::Context;

const BAGGAGE_HEADER: &str = "baggage";

// Characters that cannot appear raw in a baggage value.
const VALUE_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b',')
    .add(b';')
    .add(b'\\')
    .add(b'%')
    .add(b'=');

/// Propagates [`Baggage`] through the `baggage` header as
/// comma-separated `key=value` pairs with percent-encoded values.
#[derive(Clone, Debug, Default)]
pub struct BaggagePropagator {
    _private: (),
}

impl BaggagePropagator {
    /// Create a new propagator.
    pub fn new() -> Self {
        BaggagePropagator::default()
    }
}

impl TextMapPropagator for BaggagePropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let baggage = cx.baggage();
        if baggage.is_empty() {
            return;
        }
        let header = baggage
            .iter()
            .map(|(key, value)| format!("{key}={}", utf8_percent_encode(value, VALUE_ESCAPES)))
            .collect::<Vec<String>>()
            .join(",");
        injector.set(BAGGAGE_HEADER, header);
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        let Some(header) = extractor.get(BAGGAGE_HEADER) else {
            return cx.clone();
        };
        let mut baggage = cx.baggage().clone();
        for member in header.split(',') {
            let Some((key, value)) = member.trim().split_once('=') else {
                // Malformed members are skipped, the rest still count.
                continue;
            };
            let value = match percent_decode_str(value).decode_utf8() {
                Ok(value) => value,
                Err(_) => continue,
            };
            baggage.insert(key.trim().to_string(), value.into_owned());
        }
        cx.with_baggage(baggage)
    }

    fn fields(&self) -> Vec<&'static str> {
        vec![BAGGAGE_HEADER]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn inject_encodes_reserved_characters() {
        let propagator = BaggagePropagator::new();
        let mut baggage = Baggage::new();
        baggage.insert("user.name", "alice smith,中国");
        let cx = Context::new().with_baggage(baggage);

        let mut carrier = HashMap::new();
        propagator.inject_context(&cx, &mut carrier);
        let header = Extractor::get(&carrier, BAGGAGE_HEADER).unwrap();
        assert!(!header.contains(' '));
        assert_eq!(header.split(',').count(), 1);
    }

    #[test]
    fn round_trip_preserves_entries() {
        let propagator = BaggagePropagator::new();
        let mut baggage = Baggage::new();
        baggage.insert("tenant", "acme");
        baggage.insert("user.name", "alice smith");
        let cx = Context::new().with_baggage(baggage);

        let mut carrier = HashMap::new();
        propagator.inject_context(&cx, &mut carrier);
        let extracted = propagator.extract(&carrier);
        assert_eq!(extracted.baggage().get("tenant"), Some("acme"));
        assert_eq!(extracted.baggage().get("user.name"), Some("alice smith"));
    }

    #[test]
    fn extract_skips_malformed_members() {
        let propagator = BaggagePropagator::new();
        let mut carrier = HashMap::new();
        Injector::set(
            &mut carrier,
            BAGGAGE_HEADER,
            "good=1,no-equals-sign,also_good=2".to_string(),
        );
        let cx = propagator.extract(&carrier);
        assert_eq!(cx.baggage().get("good"), Some("1"));
        assert_eq!(cx.baggage().get("also_good"), Some("2"));
        assert_eq!(cx.baggage().len(), 2);
    }

    #[test]
    fn empty_baggage_injects_nothing() {
        let propagator = BaggagePropagator::new();
        let mut carrier: HashMap<String, String> = HashMap::new();
        propagator.inject_context(&Context::new(), &mut carrier);
        assert!(carrier.is_empty());
    }
}
