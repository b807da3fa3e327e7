//! Line-delimited JSON exporters for the tracepipe pipeline, writing
//! spans, metric collections and log records to stdout.
//!
//! Meant for development and examples; the output format is one JSON
//! object per line and carries no stability guarantee.

#![warn(missing_docs)]

mod common;
mod logs;
mod metrics;
mod trace;

pub use logs::StdoutLogHandler;
pub use metrics::MetricExporter;
pub use trace::SpanExporter;
