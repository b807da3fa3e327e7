//! The metric side of the pipeline: instruments, in-process
//! aggregation and periodic export.
//!
//! Instruments aggregate in process. A counter `add` or histogram
//! `record` updates shared state keyed by attribute set; nothing is
//! exported per measurement. The [`PeriodicReader`] snapshots all
//! instruments on an interval and hands one [`data::ResourceMetrics`]
//! to the exporter per cycle.

mod aggregate;
pub mod data;
mod exporter;
mod in_memory_exporter;
mod instrument;
mod meter;
mod periodic_reader;

pub use exporter::MetricExporter;
pub use in_memory_exporter::InMemoryMetricExporter;
pub use instrument::{
    Counter, CounterBuilder, GaugeObserver, Histogram, HistogramBuilder, InstrumentDescriptor,
    InstrumentKind, ObservableGauge, ObservableGaugeBuilder, DEFAULT_HISTOGRAM_BOUNDS,
};
pub use meter::{Meter, MetricRegistry};
pub use periodic_reader::{PeriodicReader, PeriodicReaderBuilder};
