//! Internal aggregation state behind each instrument handle.
//!
//! Counters keep an atomic cell per attribute set so the hot path is a
//! lock-free increment once a series exists. Histograms keep a small
//! mutex per series. Gauges hold no state between collections; their
//! callbacks are polled by the reader.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::metrics::data::{
    Gauge, GaugeDataPoint, Histogram, HistogramDataPoint, Sum, SumDataPoint,
};
use crate::metrics::GaugeObserver;
use crate::{Key, KeyValue, Value};

pub(crate) type GaugeCallback = Box<dyn Fn(&GaugeObserver) + Send + Sync>;

/// The canonical identity of a metric series: attributes sorted by key
/// with the last write per duplicate key retained.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct AttributeSet(Vec<KeyValue>);

impl AttributeSet {
    pub(crate) fn new(attributes: &[KeyValue]) -> Self {
        let mut map: BTreeMap<Key, Value> = BTreeMap::new();
        for kv in attributes {
            map.insert(kv.key.clone(), kv.value.clone());
        }
        AttributeSet(
            map.into_iter()
                .map(|(key, value)| KeyValue { key, value })
                .collect(),
        )
    }

    fn to_vec(&self) -> Vec<KeyValue> {
        self.0.clone()
    }
}

#[derive(Debug, Default)]
pub(crate) struct CounterState {
    points: RwLock<HashMap<AttributeSet, Arc<AtomicU64>>>,
}

impl CounterState {
    pub(crate) fn add(&self, value: u64, attributes: &[KeyValue]) {
        let set = AttributeSet::new(attributes);
        // Fast path: the series already exists and the increment is a
        // single atomic add under the read lock.
        if let Ok(points) = self.points.read() {
            if let Some(cell) = points.get(&set) {
                cell.fetch_add(value, Ordering::Relaxed);
                return;
            }
        }
        if let Ok(mut points) = self.points.write() {
            points
                .entry(set)
                .or_insert_with(|| Arc::new(AtomicU64::new(0)))
                .fetch_add(value, Ordering::Relaxed);
        }
    }

    pub(crate) fn collect(&self) -> Sum {
        let data_points = self
            .points
            .read()
            .map(|points| {
                points
                    .iter()
                    .map(|(set, cell)| SumDataPoint {
                        attributes: set.to_vec(),
                        value: cell.load(Ordering::Relaxed),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Sum { data_points }
    }
}

#[derive(Debug, Default)]
struct HistogramCell {
    count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    bucket_counts: Vec<u64>,
}

#[derive(Debug)]
pub(crate) struct HistogramState {
    bounds: Vec<f64>,
    points: RwLock<HashMap<AttributeSet, Arc<Mutex<HistogramCell>>>>,
}

impl HistogramState {
    pub(crate) fn new(bounds: Vec<f64>) -> Self {
        HistogramState {
            bounds,
            points: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    pub(crate) fn record(&self, value: f64, attributes: &[KeyValue]) {
        if !value.is_finite() {
            tracing::warn!(
                name: "Histogram.NonFiniteValue",
                "non-finite histogram measurement discarded"
            );
            return;
        }
        let set = AttributeSet::new(attributes);
        let cell = self.points.read().ok().and_then(|points| {
            points.get(&set).cloned()
        });
        let cell = match cell {
            Some(cell) => cell,
            None => match self.points.write() {
                Ok(mut points) => points
                    .entry(set)
                    .or_insert_with(|| {
                        Arc::new(Mutex::new(HistogramCell {
                            bucket_counts: vec![0; self.bounds.len() + 1],
                            ..HistogramCell::default()
                        }))
                    })
                    .clone(),
                Err(_) => return,
            },
        };
        if let Ok(mut cell) = cell.lock() {
            // A value lands in the first bucket whose upper bound
            // exceeds it; the final bucket catches everything else.
            let index = self.bounds.partition_point(|bound| *bound <= value);
            cell.bucket_counts[index] += 1;
            cell.count += 1;
            cell.sum += value;
            cell.min = Some(cell.min.map_or(value, |min| min.min(value)));
            cell.max = Some(cell.max.map_or(value, |max| max.max(value)));
        };
    }

    pub(crate) fn collect(&self) -> Histogram {
        let data_points = self
            .points
            .read()
            .map(|points| {
                points
                    .iter()
                    .filter_map(|(set, cell)| {
                        let cell = cell.lock().ok()?;
                        Some(HistogramDataPoint {
                            attributes: set.to_vec(),
                            count: cell.count,
                            bucket_counts: cell.bucket_counts.clone(),
                            sum: cell.sum,
                            min: cell.min,
                            max: cell.max,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Histogram {
            bounds: self.bounds.clone(),
            data_points,
        }
    }
}

pub(crate) struct GaugeState {
    callbacks: Mutex<Vec<GaugeCallback>>,
}

impl std::fmt::Debug for GaugeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.callbacks.lock().map(|cbs| cbs.len()).unwrap_or(0);
        f.debug_struct("GaugeState")
            .field("callbacks", &count)
            .finish()
    }
}

impl GaugeState {
    pub(crate) fn new() -> Self {
        GaugeState {
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add_callback(&self, callback: GaugeCallback) {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.push(callback);
        }
    }

    /// Run every callback synchronously and return what they observed.
    pub(crate) fn collect(&self) -> Gauge {
        let observer = GaugeObserver::default();
        if let Ok(callbacks) = self.callbacks.lock() {
            for callback in callbacks.iter() {
                callback(&observer);
            }
        }
        let data_points = observer
            .observations
            .into_inner()
            .map(|observations| {
                observations
                    .into_iter()
                    .map(|(set, value)| GaugeDataPoint {
                        attributes: set.to_vec(),
                        value,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Gauge { data_points }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_sets_are_order_insensitive() {
        let a = AttributeSet::new(&[KeyValue::new("x", 1), KeyValue::new("y", 2)]);
        let b = AttributeSet::new(&[KeyValue::new("y", 2), KeyValue::new("x", 1)]);
        assert_eq!(a, b);
    }

    #[test]
    fn attribute_sets_keep_last_duplicate() {
        let a = AttributeSet::new(&[KeyValue::new("x", 1), KeyValue::new("x", 2)]);
        let b = AttributeSet::new(&[KeyValue::new("x", 2)]);
        assert_eq!(a, b);
    }

    #[test]
    fn counter_accumulates_per_attribute_set() {
        let state = CounterState::default();
        state.add(2, &[KeyValue::new("status", "ok")]);
        state.add(3, &[KeyValue::new("status", "ok")]);
        state.add(7, &[KeyValue::new("status", "error")]);

        let sum = state.collect();
        assert_eq!(sum.data_points.len(), 2);
        let total: u64 = sum.data_points.iter().map(|p| p.value).sum();
        assert_eq!(total, 12);
    }

    #[test]
    fn histogram_bucket_edges() {
        let state = HistogramState::new(vec![0.1, 0.5, 1.0, 2.0, 5.0]);
        // A value equal to a bound belongs to the next bucket.
        state.record(0.1, &[]);
        state.record(0.05, &[]);
        state.record(0.3, &[]);
        state.record(10.0, &[]);

        let histogram = state.collect();
        let point = &histogram.data_points[0];
        assert_eq!(point.count, 4);
        assert_eq!(point.bucket_counts, vec![1, 2, 0, 0, 0, 1]);
        assert_eq!(point.min, Some(0.05));
        assert_eq!(point.max, Some(10.0));
        assert!((point.sum - 10.45).abs() < 1e-9);
    }

    #[test]
    fn histogram_discards_non_finite() {
        let state = HistogramState::new(vec![1.0]);
        state.record(f64::NAN, &[]);
        state.record(f64::INFINITY, &[]);
        assert!(state.collect().data_points.is_empty());
    }

    #[test]
    fn gauge_last_observation_wins() {
        let state = GaugeState::new();
        state.add_callback(Box::new(|observer| {
            observer.observe(1.0, &[]);
            observer.observe(5.0, &[]);
        }));

        let gauge = state.collect();
        assert_eq!(gauge.data_points.len(), 1);
        assert_eq!(gauge.data_points[0].value, 5.0);
    }

    #[test]
    fn gauge_holds_nothing_between_collections() {
        let counter = Arc::new(AtomicU64::new(0));
        let state = GaugeState::new();
        let observed = counter.clone();
        state.add_callback(Box::new(move |observer| {
            observer.observe(observed.fetch_add(1, Ordering::Relaxed) as f64, &[]);
        }));

        assert_eq!(state.collect().data_points[0].value, 0.0);
        assert_eq!(state.collect().data_points[0].value, 1.0);
    }
}
