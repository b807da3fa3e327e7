use std::time::Duration;

use thiserror::Error;

use crate::metrics::InstrumentKind;

/// A specialized `Result` for trace pipeline operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by the span side of the pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// The exporter rejected or failed to deliver a batch.
    #[error("span export failed: {0}")]
    ExportFailed(String),

    /// An export or shutdown did not finish within its deadline.
    #[error("span export timed out after {0:?}")]
    ExportTimedOut(Duration),

    /// The component was already shut down when the call was made.
    #[error("trace pipeline already shut down")]
    AlreadyShutdown,

    /// Any other trace failure.
    #[error("{0}")]
    Other(String),
}

/// A specialized `Result` for metric pipeline operations.
pub type MetricResult<T> = Result<T, MetricError>;

/// Errors returned by the metric side of the pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MetricError {
    /// Invalid instrument or reader configuration.
    #[error("invalid metric configuration: {0}")]
    Config(String),

    /// An instrument name was registered twice with conflicting kinds.
    #[error("instrument `{name}` already registered as {existing:?}")]
    DuplicateInstrument {
        /// The conflicting instrument name.
        name: String,
        /// The kind under which the name was first registered.
        existing: InstrumentKind,
    },

    /// The exporter rejected or failed to deliver collected metrics.
    #[error("metric export failed: {0}")]
    ExportFailed(String),

    /// An export or shutdown did not finish within its deadline.
    #[error("metric export timed out after {0:?}")]
    ExportTimedOut(Duration),

    /// The component was already shut down when the call was made.
    #[error("metric pipeline already shut down")]
    AlreadyShutdown,

    /// Any other metric failure.
    #[error("{0}")]
    Other(String),
}

/// Umbrella error for operations that span both pipelines, such as
/// provider construction and shutdown.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failure in the span pipeline.
    #[error(transparent)]
    Trace(#[from] TraceError),

    /// Failure in the metric pipeline.
    #[error(transparent)]
    Metric(#[from] MetricError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_detail() {
        let err = TraceError::ExportFailed("connection refused".to_string());
        assert_eq!(err.to_string(), "span export failed: connection refused");

        let err = MetricError::ExportTimedOut(Duration::from_secs(30));
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn umbrella_error_is_transparent() {
        let err: Error = TraceError::AlreadyShutdown.into();
        assert_eq!(err.to_string(), "trace pipeline already shut down");

        let err: Error = MetricError::AlreadyShutdown.into();
        assert_eq!(err.to_string(), "metric pipeline already shut down");
    }
}
