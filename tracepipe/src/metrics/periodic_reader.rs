//! The bridge between instrument state and a [`MetricExporter`]: a
//! dedicated worker thread that collects every registered instrument on
//! a fixed interval, on demand, and once more at shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use futures_executor::block_on;

use crate::error::{MetricError, MetricResult};
use crate::metrics::data::ResourceMetrics;
use crate::metrics::meter::MetricRegistry;
use crate::metrics::MetricExporter;
use crate::Resource;

/// Collection interval in milliseconds.
const ENV_EXPORT_INTERVAL: &str = "TRACEPIPE_METRIC_EXPORT_INTERVAL";
/// Default collection interval.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
/// Flush and shutdown deadline in milliseconds.
const ENV_EXPORT_TIMEOUT: &str = "TRACEPIPE_METRIC_EXPORT_TIMEOUT";
/// Default flush and shutdown deadline.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
enum Message {
    Flush(SyncSender<MetricResult<()>>),
    Shutdown(SyncSender<MetricResult<()>>),
}

/// What the reader collects from, wired in by the provider after
/// construction.
#[derive(Debug)]
struct Pipeline {
    registry: Weak<MetricRegistry>,
    resource: Resource,
    start_time: SystemTime,
}

/// Drives periodic collection and export of metrics from its own
/// worker thread.
///
/// Cheap to clone; all clones share the worker. Gauge callbacks run on
/// the worker thread during collection, never on application threads.
#[derive(Clone, Debug)]
pub struct PeriodicReader {
    inner: Arc<PeriodicReaderInner>,
}

#[derive(Debug)]
struct PeriodicReaderInner {
    exporter: Box<dyn MetricExporter>,
    message_sender: Mutex<mpsc::Sender<Message>>,
    pipeline: Mutex<Option<Pipeline>>,
    timeout: Duration,
    is_shutdown: AtomicBool,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PeriodicReader {
    /// Start building a reader around `exporter`.
    pub fn builder<E>(exporter: E) -> PeriodicReaderBuilder<E>
    where
        E: MetricExporter + 'static,
    {
        PeriodicReaderBuilder::new(exporter)
    }

    fn new<E>(exporter: E, interval: Duration, timeout: Duration) -> Self
    where
        E: MetricExporter + 'static,
    {
        let (message_sender, message_receiver) = mpsc::channel();
        let reader = PeriodicReader {
            inner: Arc::new(PeriodicReaderInner {
                exporter: Box::new(exporter),
                message_sender: Mutex::new(message_sender),
                pipeline: Mutex::new(None),
                timeout,
                is_shutdown: AtomicBool::new(false),
                handle: Mutex::new(None),
            }),
        };

        let worker = reader.clone();
        let handle = thread::Builder::new()
            .name("tracepipe.PeriodicReader".to_string())
            .spawn(move || {
                let mut last_collect = Instant::now();
                loop {
                    let timeout = interval.saturating_sub(last_collect.elapsed());
                    match message_receiver.recv_timeout(timeout) {
                        Ok(Message::Flush(reply)) => {
                            let _ = reply.send(worker.collect_and_export());
                        }
                        Ok(Message::Shutdown(reply)) => {
                            let result = worker.collect_and_export();
                            worker.inner.exporter.shutdown();
                            let _ = reply.send(result);
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(err) = worker.collect_and_export() {
                                tracing::warn!(
                                    name: "PeriodicReader.ExportError",
                                    error = %err,
                                    "periodic metric export failed"
                                );
                            }
                            last_collect = Instant::now();
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .ok();
        if handle.is_none() {
            tracing::error!(
                name: "PeriodicReader.ThreadSpawnFailed",
                "failed to spawn metric export worker, metrics will not be exported"
            );
        }
        if let Ok(mut slot) = reader.inner.handle.lock() {
            *slot = handle;
        }
        reader
    }

    /// Wire the reader to the registry it collects from. Until this is
    /// called, timer ticks export nothing.
    pub(crate) fn register(&self, registry: &Arc<MetricRegistry>, resource: Resource) {
        if let Ok(mut pipeline) = self.inner.pipeline.lock() {
            *pipeline = Some(Pipeline {
                registry: Arc::downgrade(registry),
                resource,
                start_time: SystemTime::now(),
            });
        }
    }

    fn collect_and_export(&self) -> MetricResult<()> {
        let metrics = {
            let pipeline = self
                .inner
                .pipeline
                .lock()
                .map_err(|_| MetricError::Other("reader pipeline mutex poisoned".to_string()))?;
            let Some(pipeline) = pipeline.as_ref() else {
                // Nothing registered yet; a tick before wiring is fine.
                return Ok(());
            };
            let Some(registry) = pipeline.registry.upgrade() else {
                return Err(MetricError::Other(
                    "metric registry dropped without shutdown".to_string(),
                ));
            };
            ResourceMetrics {
                resource: pipeline.resource.clone(),
                start_time: pipeline.start_time,
                timestamp: SystemTime::now(),
                metrics: registry.collect(),
            }
        };
        block_on(self.inner.exporter.export(&metrics))
    }

    /// Collect and export now, blocking until done or timed out.
    pub fn force_flush(&self) -> MetricResult<()> {
        if self.inner.is_shutdown.load(Ordering::Relaxed) {
            return Err(MetricError::AlreadyShutdown);
        }
        let (reply_sender, reply_receiver) = mpsc::sync_channel(1);
        self.send(Message::Flush(reply_sender))?;
        reply_receiver
            .recv_timeout(self.inner.timeout)
            .map_err(|_| MetricError::ExportTimedOut(self.inner.timeout))?
    }

    /// Shut down with the default deadline.
    pub fn shutdown(&self) -> MetricResult<()> {
        self.shutdown_with_timeout(self.inner.timeout)
    }

    /// Collect once more, export, shut the exporter down and release
    /// the worker, giving up after `timeout`.
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> MetricResult<()> {
        if self.inner.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(MetricError::AlreadyShutdown);
        }
        let (reply_sender, reply_receiver) = mpsc::sync_channel(1);
        self.send(Message::Shutdown(reply_sender))?;
        let result = reply_receiver
            .recv_timeout(timeout)
            .map_err(|_| MetricError::ExportTimedOut(timeout))?;
        // Join only after the worker acknowledged, so a hung export
        // cannot hang the caller past its deadline.
        if let Ok(mut handle) = self.inner.handle.lock() {
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
        result
    }

    fn send(&self, message: Message) -> MetricResult<()> {
        let sender = self
            .inner
            .message_sender
            .lock()
            .map_err(|_| MetricError::Other("reader sender mutex poisoned".to_string()))?;
        sender
            .send(message)
            .map_err(|_| MetricError::Other("metric export worker is no longer running".to_string()))
    }
}

/// Builder for [`PeriodicReader`], seeded from the
/// `TRACEPIPE_METRIC_EXPORT_*` environment variables when set.
#[derive(Debug)]
pub struct PeriodicReaderBuilder<E> {
    exporter: E,
    interval: Duration,
    timeout: Duration,
}

impl<E> PeriodicReaderBuilder<E>
where
    E: MetricExporter + 'static,
{
    /// Environment variables, when present and parseable, override the
    /// built-in defaults:
    ///
    /// * `TRACEPIPE_METRIC_EXPORT_INTERVAL` (milliseconds, default 10000)
    /// * `TRACEPIPE_METRIC_EXPORT_TIMEOUT` (milliseconds, default 30000)
    fn new(exporter: E) -> Self {
        let interval = std::env::var(ENV_EXPORT_INTERVAL)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_INTERVAL);
        let timeout = std::env::var(ENV_EXPORT_TIMEOUT)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);
        PeriodicReaderBuilder {
            exporter,
            interval,
            timeout,
        }
    }

    /// Set the collection interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// Set the flush and shutdown deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Build the reader, spawning its worker thread.
    pub fn build(self) -> PeriodicReader {
        PeriodicReader::new(self.exporter, self.interval, self.timeout)
    }
}
