//! The data model handed to metric exporters: one [`ResourceMetrics`]
//! per collection cycle, containing a point-in-time snapshot of every
//! registered instrument.

use std::borrow::Cow;
use std::time::SystemTime;

use crate::{KeyValue, Resource};

/// Everything collected in one cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceMetrics {
    /// The entity that produced these metrics.
    pub resource: Resource,
    /// When the pipeline started accumulating.
    pub start_time: SystemTime,
    /// When this collection was taken. All metrics in one collection
    /// share this timestamp.
    pub timestamp: SystemTime,
    /// One entry per instrument that has data.
    pub metrics: Vec<Metric>,
}

/// A single instrument's snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    /// The instrument name.
    pub name: Cow<'static, str>,
    /// The instrument description, possibly empty.
    pub description: Cow<'static, str>,
    /// The unit of measure, possibly empty.
    pub unit: Cow<'static, str>,
    /// The aggregated data.
    pub data: MetricData,
}

/// The aggregation produced by each instrument kind.
#[derive(Clone, Debug, PartialEq)]
pub enum MetricData {
    /// Monotonic cumulative sums, from counters.
    Sum(Sum),
    /// Bucketed distributions, from histograms.
    Histogram(Histogram),
    /// Last observed values, from observable gauges.
    Gauge(Gauge),
}

/// Cumulative monotonic sums, one data point per attribute set.
#[derive(Clone, Debug, PartialEq)]
pub struct Sum {
    /// The per-attribute-set totals.
    pub data_points: Vec<SumDataPoint>,
}

/// One counter series.
#[derive(Clone, Debug, PartialEq)]
pub struct SumDataPoint {
    /// The attribute set identifying this series.
    pub attributes: Vec<KeyValue>,
    /// The cumulative total since pipeline start.
    pub value: u64,
}

/// Bucketed distributions, one data point per attribute set.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    /// The bucket upper bounds shared by every data point. A value `v`
    /// falls into the first bucket whose bound exceeds `v`; the last
    /// bucket is unbounded.
    pub bounds: Vec<f64>,
    /// The per-attribute-set distributions.
    pub data_points: Vec<HistogramDataPoint>,
}

/// One histogram series.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramDataPoint {
    /// The attribute set identifying this series.
    pub attributes: Vec<KeyValue>,
    /// Total number of recorded values.
    pub count: u64,
    /// Per-bucket counts; always `bounds.len() + 1` entries.
    pub bucket_counts: Vec<u64>,
    /// Sum of all recorded values.
    pub sum: f64,
    /// Smallest recorded value, `None` when no values were recorded.
    pub min: Option<f64>,
    /// Largest recorded value, `None` when no values were recorded.
    pub max: Option<f64>,
}

/// Last-value observations, one data point per attribute set.
#[derive(Clone, Debug, PartialEq)]
pub struct Gauge {
    /// The most recent observations.
    pub data_points: Vec<GaugeDataPoint>,
}

/// One gauge series.
#[derive(Clone, Debug, PartialEq)]
pub struct GaugeDataPoint {
    /// The attribute set identifying this series.
    pub attributes: Vec<KeyValue>,
    /// The value observed during the most recent collection.
    pub value: f64,
}
