use std::borrow::Cow;
use std::sync::Arc;

use crate::error::MetricResult;
use crate::metrics::aggregate::{CounterState, GaugeState, HistogramState};
use crate::metrics::Meter;
use crate::KeyValue;

/// Histogram bucket bounds used when the caller does not provide any,
/// tuned for request latencies in seconds.
pub const DEFAULT_HISTOGRAM_BOUNDS: [f64; 5] = [0.1, 0.5, 1.0, 2.0, 5.0];

/// The kinds of instrument a meter can create.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstrumentKind {
    /// Monotonically increasing sum.
    Counter,
    /// Bucketed distribution of recorded values.
    Histogram,
    /// Last value reported by registered callbacks.
    ObservableGauge,
}

/// The identity of an instrument: name, kind, description and unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstrumentDescriptor {
    /// The registered name.
    pub name: Cow<'static, str>,
    /// The instrument kind.
    pub kind: InstrumentKind,
    /// Optional human readable description.
    pub description: Cow<'static, str>,
    /// Optional unit of measure.
    pub unit: Cow<'static, str>,
}

/// A monotonic counter handle. Cheap to clone; clones feed the same
/// series.
#[derive(Clone, Debug)]
pub struct Counter {
    pub(crate) state: Arc<CounterState>,
}

impl Counter {
    /// Add `value` to the series identified by `attributes`.
    ///
    /// Negative values are rejected with a diagnostic; the counter is
    /// monotonic.
    pub fn add(&self, value: i64, attributes: &[KeyValue]) {
        match u64::try_from(value) {
            Ok(value) => self.state.add(value, attributes),
            Err(_) => tracing::warn!(
                name: "Counter.NegativeValue",
                value,
                "negative counter increment discarded"
            ),
        }
    }
}

/// A histogram handle. Cheap to clone; clones feed the same series.
#[derive(Clone, Debug)]
pub struct Histogram {
    pub(crate) state: Arc<HistogramState>,
}

impl Histogram {
    /// Record one measurement into the series identified by
    /// `attributes`. Non-finite values are discarded.
    pub fn record(&self, value: f64, attributes: &[KeyValue]) {
        self.state.record(value, attributes);
    }
}

/// An observable gauge handle. The value is supplied by callbacks run
/// at collection time, not pushed by the application.
#[derive(Clone, Debug)]
pub struct ObservableGauge {
    pub(crate) _state: Arc<GaugeState>,
}

/// Passed to gauge callbacks to receive observations.
///
/// Within one collection, the last observation per attribute set wins.
#[derive(Debug, Default)]
pub struct GaugeObserver {
    pub(crate) observations: std::sync::Mutex<
        std::collections::HashMap<crate::metrics::aggregate::AttributeSet, f64>,
    >,
}

impl GaugeObserver {
    /// Report the current value for the series identified by
    /// `attributes`.
    pub fn observe(&self, value: f64, attributes: &[KeyValue]) {
        if !value.is_finite() {
            tracing::warn!(
                name: "ObservableGauge.NonFiniteValue",
                "non-finite gauge observation discarded"
            );
            return;
        }
        if let Ok(mut observations) = self.observations.lock() {
            observations.insert(
                crate::metrics::aggregate::AttributeSet::new(attributes),
                value,
            );
        }
    }
}

/// Builder returned by [`Meter::counter`].
#[derive(Debug)]
pub struct CounterBuilder<'a> {
    pub(crate) meter: &'a Meter,
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Cow<'static, str>,
    pub(crate) unit: Cow<'static, str>,
}

impl CounterBuilder<'_> {
    /// Set the instrument description.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the unit of measure.
    pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Register the instrument. Fails on an invalid name or when the
    /// name is already registered as a different kind.
    pub fn build(self) -> MetricResult<Counter> {
        self.meter.registry().register_counter(InstrumentDescriptor {
            name: self.name,
            kind: InstrumentKind::Counter,
            description: self.description,
            unit: self.unit,
        })
    }
}

/// Builder returned by [`Meter::histogram`].
#[derive(Debug)]
pub struct HistogramBuilder<'a> {
    pub(crate) meter: &'a Meter,
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Cow<'static, str>,
    pub(crate) unit: Cow<'static, str>,
    pub(crate) boundaries: Option<Vec<f64>>,
}

impl HistogramBuilder<'_> {
    /// Set the instrument description.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the unit of measure.
    pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Replace the default bucket bounds. Bounds must be finite and
    /// strictly increasing.
    pub fn with_boundaries(mut self, boundaries: Vec<f64>) -> Self {
        self.boundaries = Some(boundaries);
        self
    }

    /// Register the instrument. Fails on an invalid name, invalid
    /// bounds, or when the name is already registered with a different
    /// kind or different bounds.
    pub fn build(self) -> MetricResult<Histogram> {
        let bounds = self
            .boundaries
            .unwrap_or_else(|| DEFAULT_HISTOGRAM_BOUNDS.to_vec());
        self.meter.registry().register_histogram(
            InstrumentDescriptor {
                name: self.name,
                kind: InstrumentKind::Histogram,
                description: self.description,
                unit: self.unit,
            },
            bounds,
        )
    }
}

/// Builder returned by [`Meter::observable_gauge`].
pub struct ObservableGaugeBuilder<'a> {
    pub(crate) meter: &'a Meter,
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Cow<'static, str>,
    pub(crate) unit: Cow<'static, str>,
    pub(crate) callback: Option<Box<dyn Fn(&GaugeObserver) + Send + Sync>>,
}

impl std::fmt::Debug for ObservableGaugeBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableGaugeBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl ObservableGaugeBuilder<'_> {
    /// Set the instrument description.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the unit of measure.
    pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Register the callback polled at each collection.
    pub fn with_callback(
        mut self,
        callback: impl Fn(&GaugeObserver) + Send + Sync + 'static,
    ) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Register the instrument. Registering the same gauge name again
    /// adds another callback to it.
    pub fn build(self) -> MetricResult<ObservableGauge> {
        self.meter.registry().register_gauge(
            InstrumentDescriptor {
                name: self.name,
                kind: InstrumentKind::ObservableGauge,
                description: self.description,
                unit: self.unit,
            },
            self.callback,
        )
    }
}
