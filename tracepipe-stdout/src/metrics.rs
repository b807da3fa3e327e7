use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::json;
use tracepipe::metrics::data::{Metric, MetricData, ResourceMetrics};
use tracepipe::MetricResult;

use crate::common::{attributes_json, resource_json, unix_nanos};

/// Writes each collection cycle as one JSON line per metric on stdout.
#[derive(Debug, Default)]
pub struct MetricExporter {
    _private: (),
}

impl MetricExporter {
    /// Create a new exporter.
    pub fn new() -> Self {
        MetricExporter::default()
    }
}

fn data_json(metric: &Metric) -> serde_json::Value {
    match &metric.data {
        MetricData::Sum(sum) => json!({
            "type": "sum",
            "monotonic": true,
            "data_points": sum.data_points.iter().map(|point| json!({
                "attributes": attributes_json(&point.attributes),
                "value": point.value,
            })).collect::<Vec<_>>(),
        }),
        MetricData::Histogram(histogram) => json!({
            "type": "histogram",
            "bounds": histogram.bounds,
            "data_points": histogram.data_points.iter().map(|point| json!({
                "attributes": attributes_json(&point.attributes),
                "count": point.count,
                "sum": point.sum,
                "min": point.min,
                "max": point.max,
                "bucket_counts": point.bucket_counts,
            })).collect::<Vec<_>>(),
        }),
        MetricData::Gauge(gauge) => json!({
            "type": "gauge",
            "data_points": gauge.data_points.iter().map(|point| json!({
                "attributes": attributes_json(&point.attributes),
                "value": point.value,
            })).collect::<Vec<_>>(),
        }),
    }
}

impl tracepipe::metrics::MetricExporter for MetricExporter {
    fn export<'a>(&'a self, metrics: &'a ResourceMetrics) -> BoxFuture<'a, MetricResult<()>> {
        for metric in &metrics.metrics {
            let line = json!({
                "kind": "metric",
                "name": metric.name.as_ref(),
                "description": metric.description.as_ref(),
                "unit": metric.unit.as_ref(),
                "start_time_unix_nano": unix_nanos(metrics.start_time).to_string(),
                "time_unix_nano": unix_nanos(metrics.timestamp).to_string(),
                "data": data_json(metric),
                "resource": resource_json(&metrics.resource),
            });
            println!("{line}");
        }
        async { Ok(()) }.boxed()
    }
}
