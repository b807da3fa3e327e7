use std::borrow::Cow;
use std::sync::{Arc, Mutex};

use crate::error::{MetricError, MetricResult};
use crate::metrics::aggregate::{CounterState, GaugeCallback, GaugeState, HistogramState};
use crate::metrics::data::{Metric, MetricData};
use crate::metrics::instrument::{
    Counter, CounterBuilder, Histogram, HistogramBuilder, InstrumentDescriptor, InstrumentKind,
    ObservableGauge, ObservableGaugeBuilder,
};

const MAX_INSTRUMENT_NAME_LEN: usize = 255;

/// Creates instruments backed by a shared [`MetricRegistry`].
///
/// Cheap to clone; all meters from one provider feed the same registry.
#[derive(Clone, Debug)]
pub struct Meter {
    registry: Arc<MetricRegistry>,
}

impl Meter {
    pub(crate) fn new(registry: Arc<MetricRegistry>) -> Self {
        Meter { registry }
    }

    pub(crate) fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Start building a monotonic counter.
    pub fn counter(&self, name: impl Into<Cow<'static, str>>) -> CounterBuilder<'_> {
        CounterBuilder {
            meter: self,
            name: name.into(),
            description: Cow::Borrowed(""),
            unit: Cow::Borrowed(""),
        }
    }

    /// Start building a histogram.
    pub fn histogram(&self, name: impl Into<Cow<'static, str>>) -> HistogramBuilder<'_> {
        HistogramBuilder {
            meter: self,
            name: name.into(),
            description: Cow::Borrowed(""),
            unit: Cow::Borrowed(""),
            boundaries: None,
        }
    }

    /// Start building an observable gauge.
    pub fn observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableGaugeBuilder<'_> {
        ObservableGaugeBuilder {
            meter: self,
            name: name.into(),
            description: Cow::Borrowed(""),
            unit: Cow::Borrowed(""),
            callback: None,
        }
    }
}

#[derive(Debug)]
enum InstrumentState {
    Counter(Arc<CounterState>),
    Histogram(Arc<HistogramState>),
    Gauge(Arc<GaugeState>),
}

impl InstrumentState {
    fn kind(&self) -> InstrumentKind {
        match self {
            InstrumentState::Counter(_) => InstrumentKind::Counter,
            InstrumentState::Histogram(_) => InstrumentKind::Histogram,
            InstrumentState::Gauge(_) => InstrumentKind::ObservableGauge,
        }
    }
}

#[derive(Debug)]
struct Registered {
    descriptor: InstrumentDescriptor,
    state: InstrumentState,
}

/// Holds every registered instrument and snapshots them on demand.
///
/// Registration is rare and collection walks all instruments, so a
/// plain vector behind a mutex is enough; the measurement hot paths
/// never touch this lock.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    instruments: Mutex<Vec<Registered>>,
}

impl MetricRegistry {
    pub(crate) fn new() -> Self {
        MetricRegistry::default()
    }

    pub(crate) fn register_counter(
        &self,
        descriptor: InstrumentDescriptor,
    ) -> MetricResult<Counter> {
        validate_instrument_name(&descriptor.name)?;
        let mut instruments = lock_registry(&self.instruments)?;
        if let Some(existing) = instruments.iter().find(|r| r.descriptor.name == descriptor.name) {
            return match &existing.state {
                InstrumentState::Counter(state) => Ok(Counter {
                    state: state.clone(),
                }),
                other => Err(duplicate(&descriptor.name, other)),
            };
        }
        let state = Arc::new(CounterState::default());
        instruments.push(Registered {
            descriptor,
            state: InstrumentState::Counter(state.clone()),
        });
        Ok(Counter { state })
    }

    pub(crate) fn register_histogram(
        &self,
        descriptor: InstrumentDescriptor,
        bounds: Vec<f64>,
    ) -> MetricResult<Histogram> {
        validate_instrument_name(&descriptor.name)?;
        validate_bounds(&descriptor.name, &bounds)?;
        let mut instruments = lock_registry(&self.instruments)?;
        if let Some(existing) = instruments.iter().find(|r| r.descriptor.name == descriptor.name) {
            return match &existing.state {
                InstrumentState::Histogram(state) => {
                    if state.bounds() != bounds.as_slice() {
                        return Err(MetricError::Config(format!(
                            "histogram `{}` already registered with different bounds",
                            descriptor.name
                        )));
                    }
                    Ok(Histogram {
                        state: state.clone(),
                    })
                }
                other => Err(duplicate(&descriptor.name, other)),
            };
        }
        let state = Arc::new(HistogramState::new(bounds));
        instruments.push(Registered {
            descriptor,
            state: InstrumentState::Histogram(state.clone()),
        });
        Ok(Histogram { state })
    }

    pub(crate) fn register_gauge(
        &self,
        descriptor: InstrumentDescriptor,
        callback: Option<GaugeCallback>,
    ) -> MetricResult<ObservableGauge> {
        validate_instrument_name(&descriptor.name)?;
        let mut instruments = lock_registry(&self.instruments)?;
        let state = match instruments
            .iter()
            .find(|r| r.descriptor.name == descriptor.name)
        {
            Some(existing) => match &existing.state {
                InstrumentState::Gauge(state) => state.clone(),
                other => return Err(duplicate(&descriptor.name, other)),
            },
            None => {
                let state = Arc::new(GaugeState::new());
                instruments.push(Registered {
                    descriptor,
                    state: InstrumentState::Gauge(state.clone()),
                });
                state
            }
        };
        if let Some(callback) = callback {
            state.add_callback(callback);
        }
        Ok(ObservableGauge { _state: state })
    }

    /// Snapshot every instrument, in registration order. Gauge
    /// callbacks run synchronously on the calling thread.
    pub(crate) fn collect(&self) -> Vec<Metric> {
        let instruments = match self.instruments.lock() {
            Ok(instruments) => instruments,
            Err(_) => return Vec::new(),
        };
        instruments
            .iter()
            .map(|registered| {
                let data = match &registered.state {
                    InstrumentState::Counter(state) => MetricData::Sum(state.collect()),
                    InstrumentState::Histogram(state) => MetricData::Histogram(state.collect()),
                    InstrumentState::Gauge(state) => MetricData::Gauge(state.collect()),
                };
                Metric {
                    name: registered.descriptor.name.clone(),
                    description: registered.descriptor.description.clone(),
                    unit: registered.descriptor.unit.clone(),
                    data,
                }
            })
            .collect()
    }
}

fn lock_registry(
    instruments: &Mutex<Vec<Registered>>,
) -> MetricResult<std::sync::MutexGuard<'_, Vec<Registered>>> {
    instruments
        .lock()
        .map_err(|_| MetricError::Other("metric registry mutex poisoned".to_string()))
}

fn duplicate(name: &str, existing: &InstrumentState) -> MetricError {
    MetricError::DuplicateInstrument {
        name: name.to_string(),
        existing: existing.kind(),
    }
}

fn validate_instrument_name(name: &str) -> MetricResult<()> {
    if name.is_empty() {
        return Err(MetricError::Config("instrument name is empty".to_string()));
    }
    if name.len() > MAX_INSTRUMENT_NAME_LEN {
        return Err(MetricError::Config(format!(
            "instrument name `{name}` exceeds {MAX_INSTRUMENT_NAME_LEN} characters"
        )));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(MetricError::Config(format!(
            "instrument name `{name}` must start with a letter"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '-' | '.' | '/'))
    {
        return Err(MetricError::Config(format!(
            "instrument name `{name}` contains invalid character `{bad}`"
        )));
    }
    Ok(())
}

fn validate_bounds(name: &str, bounds: &[f64]) -> MetricResult<()> {
    if bounds.iter().any(|b| !b.is_finite()) {
        return Err(MetricError::Config(format!(
            "histogram `{name}` has non-finite bucket bounds"
        )));
    }
    if bounds.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(MetricError::Config(format!(
            "histogram `{name}` bucket bounds must be strictly increasing"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyValue;

    fn meter() -> Meter {
        Meter::new(Arc::new(MetricRegistry::new()))
    }

    #[test]
    fn same_name_same_kind_shares_state() {
        let meter = meter();
        let first = meter.counter("requests.total").build().unwrap();
        let second = meter.counter("requests.total").build().unwrap();
        first.add(1, &[]);
        second.add(2, &[]);

        let metrics = meter.registry().collect();
        assert_eq!(metrics.len(), 1);
        let MetricData::Sum(sum) = &metrics[0].data else {
            panic!("expected a sum");
        };
        assert_eq!(sum.data_points[0].value, 3);
    }

    #[test]
    fn counter_rejects_negative_increments() {
        let meter = meter();
        let counter = meter.counter("requests.total").build().unwrap();
        counter.add(4, &[]);
        counter.add(-10, &[]);

        let metrics = meter.registry().collect();
        let MetricData::Sum(sum) = &metrics[0].data else {
            panic!("expected a sum");
        };
        assert_eq!(sum.data_points[0].value, 4);
    }

    #[test]
    fn same_name_different_kind_is_rejected() {
        let meter = meter();
        meter.counter("requests.total").build().unwrap();
        let err = meter.histogram("requests.total").build().unwrap_err();
        assert!(matches!(
            err,
            MetricError::DuplicateInstrument {
                existing: InstrumentKind::Counter,
                ..
            }
        ));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let meter = meter();
        assert!(meter.counter("").build().is_err());
        assert!(meter.counter("9starts.with.digit").build().is_err());
        assert!(meter.counter("has space").build().is_err());
        assert!(meter.counter("a".repeat(256)).build().is_err());
        assert!(meter.counter("valid_name-1.total/sub").build().is_ok());
    }

    #[test]
    fn invalid_histogram_bounds_are_rejected() {
        let meter = meter();
        assert!(meter
            .histogram("latency")
            .with_boundaries(vec![1.0, 1.0])
            .build()
            .is_err());
        assert!(meter
            .histogram("latency")
            .with_boundaries(vec![1.0, f64::NAN])
            .build()
            .is_err());
        assert!(meter
            .histogram("latency")
            .with_boundaries(vec![0.5, 1.0, 2.0])
            .build()
            .is_ok());
    }

    #[test]
    fn conflicting_histogram_bounds_are_rejected() {
        let meter = meter();
        meter
            .histogram("latency")
            .with_boundaries(vec![1.0, 2.0])
            .build()
            .unwrap();
        assert!(meter
            .histogram("latency")
            .with_boundaries(vec![1.0, 3.0])
            .build()
            .is_err());
    }

    #[test]
    fn gauge_callbacks_accumulate_per_name() {
        let meter = meter();
        meter
            .observable_gauge("queue.depth")
            .with_callback(|observer| observer.observe(4.0, &[KeyValue::new("shard", "a")]))
            .build()
            .unwrap();
        meter
            .observable_gauge("queue.depth")
            .with_callback(|observer| observer.observe(9.0, &[KeyValue::new("shard", "b")]))
            .build()
            .unwrap();

        let metrics = meter.registry().collect();
        assert_eq!(metrics.len(), 1);
        let MetricData::Gauge(gauge) = &metrics[0].data else {
            panic!("expected a gauge");
        };
        assert_eq!(gauge.data_points.len(), 2);
    }

    #[test]
    fn collect_preserves_registration_order() {
        let meter = meter();
        meter.counter("first").build().unwrap();
        meter.histogram("second").build().unwrap();
        meter.counter("third").build().unwrap();

        let names: Vec<_> = meter
            .registry()
            .collect()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }
}
