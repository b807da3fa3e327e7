//! An in-process telemetry pipeline: structured spans with batch
//! export, aggregated metrics with periodic collection, text-header
//! context propagation, and trace-correlated logging.
//!
//! Everything hangs off an explicitly owned [`TelemetryProvider`];
//! there is no global state. Parenthood, propagation and log
//! correlation all flow through an explicit [`Context`] value.
//!
//! ```
//! use std::time::Duration;
//! use tracepipe::{Context, KeyValue, TelemetryProvider};
//! use tracepipe::metrics::InMemoryMetricExporter;
//! use tracepipe::trace::InMemorySpanExporter;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = TelemetryProvider::builder()
//!     .with_service_name("checkout")
//!     .with_span_exporter(InMemorySpanExporter::new())
//!     .with_metric_exporter(InMemoryMetricExporter::new())
//!     .build()?;
//!
//! let tracer = provider.tracer();
//! let (cx, mut span) = tracer.start(&Context::new(), "charge-card");
//! span.set_attribute(KeyValue::new("amount_cents", 1999));
//!
//! let counter = provider.meter().counter("charges.total").build()?;
//! counter.add(1, &[KeyValue::new("status", "ok")]);
//!
//! let (_child_cx, mut child) = tracer.start(&cx, "persist-receipt");
//! child.end();
//! span.end();
//!
//! provider.shutdown(Duration::from_secs(5)).map_err(|mut errs| errs.remove(0))?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod baggage;
mod common;
mod context;
mod error;
mod provider;
mod resource;

pub mod logs;
pub mod metrics;
pub mod propagation;
pub mod trace;

pub use baggage::Baggage;
pub use common::{Key, KeyValue, Value};
pub use context::Context;
pub use error::{Error, MetricError, MetricResult, TraceError, TraceResult};
pub use provider::{TelemetryProvider, TelemetryProviderBuilder};
pub use resource::{Resource, ResourceBuilder};

// Re-exported so resource attribute constants are reachable without
// spelling the module path.
pub mod semconv {
    //! Well-known attribute keys.
    pub use crate::resource::{DEPLOYMENT_ENVIRONMENT, SERVICE_NAME, SERVICE_VERSION};
}
