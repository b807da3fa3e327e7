//! Carrying context across process boundaries through text headers.

mod baggage;
mod composite;
mod trace_context;

pub use baggage::BaggagePropagator;
pub use composite::CompositePropagator;
pub use trace_context::TraceContextPropagator;

use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;

use crate::Context;

/// A carrier that header values can be written into.
pub trait Injector {
    /// Set the header `key` to `value`.
    fn set(&mut self, key: &str, value: String);
}

/// A carrier that header values can be read out of.
pub trait Extractor {
    /// Get the value of the header `key`, if present.
    fn get(&self, key: &str) -> Option<&str>;

    /// All header keys present in the carrier.
    fn keys(&self) -> Vec<&str>;
}

impl<S: BuildHasher> Injector for HashMap<String, String, S> {
    /// Keys are lowercased on write, matching HTTP header folding.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: BuildHasher> Extractor for HashMap<String, String, S> {
    /// Lookups are case-insensitive, matching HTTP header folding.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect()
    }
}

/// Injects a [`Context`] into a carrier and extracts one back out.
///
/// Extraction never fails: a missing or malformed header yields the
/// input context unchanged so one bad peer cannot break a request path.
pub trait TextMapPropagator: Send + Sync + fmt::Debug {
    /// Write the propagation fields of `cx` into `injector`.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector);

    /// Read propagation fields from `extractor` on top of `cx`.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context;

    /// Extract into an empty context.
    fn extract(&self, extractor: &dyn Extractor) -> Context {
        self.extract_with_context(&Context::new(), extractor)
    }

    /// The header fields this propagator reads and writes.
    fn fields(&self) -> Vec<&'static str>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_map_carrier_is_case_insensitive() {
        let mut carrier = HashMap::new();
        Injector::set(&mut carrier, "TraceParent", "value".to_string());
        assert_eq!(Extractor::get(&carrier, "TRACEPARENT"), Some("value"));
        assert_eq!(Extractor::get(&carrier, "traceparent"), Some("value"));
        assert_eq!(Extractor::keys(&carrier), vec!["traceparent"]);
    }
}
