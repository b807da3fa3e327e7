//! Span processors sit between span end and export.
//!
//! [`SimpleSpanProcessor`] exports synchronously on the caller's
//! thread and exists for tests and examples. [`BatchSpanProcessor`]
//! owns a dedicated worker thread fed through a bounded channel and
//! exports when a batch fills or a timer fires, whichever comes first.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use futures_executor::block_on;

use crate::error::{TraceError, TraceResult};
use crate::trace::{SpanData, SpanExporter};
use crate::Resource;

/// Delay interval between two consecutive batch exports.
const ENV_SCHEDULE_DELAY: &str = "TRACEPIPE_BSP_SCHEDULE_DELAY";
/// Default delay interval between two consecutive exports.
const DEFAULT_SCHEDULE_DELAY: Duration = Duration::from_secs(5);
/// Maximum queue size.
const ENV_MAX_QUEUE_SIZE: &str = "TRACEPIPE_BSP_MAX_QUEUE_SIZE";
/// Default maximum queue size.
const DEFAULT_MAX_QUEUE_SIZE: usize = 2_048;
/// Maximum batch size, must be less than or equal to the queue size.
const ENV_MAX_EXPORT_BATCH_SIZE: &str = "TRACEPIPE_BSP_MAX_EXPORT_BATCH_SIZE";
/// Default maximum batch size.
const DEFAULT_MAX_EXPORT_BATCH_SIZE: usize = 512;

/// Default deadline for flush and shutdown calls.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Hooks into the span pipeline for every finished span.
pub trait SpanProcessor: Send + Sync + fmt::Debug {
    /// Called with the finished span's data when a recording span ends.
    fn on_end(&self, span: SpanData);

    /// Export any buffered spans now, blocking until done or timed out.
    fn force_flush(&self) -> TraceResult<()>;

    /// Shut down with the default deadline.
    fn shutdown(&self) -> TraceResult<()> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Export buffered spans, shut the exporter down and release the
    /// worker, giving up after `timeout`.
    fn shutdown_with_timeout(&self, timeout: Duration) -> TraceResult<()>;

    /// Receives the pipeline resource before any span is processed.
    fn set_resource(&mut self, _resource: &Resource) {}
}

/// A processor that exports each span on the thread that ends it.
///
/// Only suitable for tests and example programs; every span end pays
/// the full export latency.
#[derive(Debug)]
pub struct SimpleSpanProcessor {
    exporter: Mutex<Box<dyn SpanExporter>>,
    is_shutdown: AtomicBool,
}

impl SimpleSpanProcessor {
    /// Create a new processor wrapping `exporter`.
    pub fn new(exporter: impl SpanExporter + 'static) -> Self {
        SimpleSpanProcessor {
            exporter: Mutex::new(Box::new(exporter)),
            is_shutdown: AtomicBool::new(false),
        }
    }
}

impl SpanProcessor for SimpleSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return;
        }
        let result = self
            .exporter
            .lock()
            .map_err(|_| TraceError::Other("simple processor mutex poisoned".to_string()))
            .and_then(|mut exporter| block_on(exporter.export(vec![span])));
        if let Err(err) = result {
            tracing::warn!(
                name: "SimpleSpanProcessor.ExportError",
                error = %err,
                "span export failed"
            );
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> TraceResult<()> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        if let Ok(mut exporter) = self.exporter.lock() {
            exporter.shutdown();
        }
        Ok(())
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut exporter) = self.exporter.lock() {
            exporter.set_resource(resource);
        }
    }
}

/// Messages exchanged between the public handle and the worker thread.
#[derive(Debug)]
enum BatchMessage {
    /// A finished span to buffer.
    ExportSpan(SpanData),
    /// Export the current batch now and reply with the result.
    Flush(SyncSender<TraceResult<()>>),
    /// Export the current batch, shut the exporter down and exit.
    Shutdown(SyncSender<TraceResult<()>>),
    /// Forward the pipeline resource to the exporter.
    SetResource(Arc<Resource>),
}

/// Buffers finished spans and exports them in batches from a dedicated
/// worker thread.
///
/// A batch is exported when it reaches `max_export_batch_size` spans or
/// when `scheduled_delay` has elapsed since the previous export. The
/// feeding channel is bounded by `max_queue_size`; when it is full,
/// spans are counted and dropped rather than blocking the application.
#[derive(Debug)]
pub struct BatchSpanProcessor {
    message_sender: SyncSender<BatchMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    flush_timeout: Duration,
    is_shutdown: AtomicBool,
    dropped_spans: Arc<AtomicUsize>,
    max_queue_size: usize,
}

impl BatchSpanProcessor {
    /// Create a new batch processor exporting to `exporter`.
    pub fn new<E>(exporter: E, config: BatchConfig) -> Self
    where
        E: SpanExporter + 'static,
    {
        let (message_sender, message_receiver) = mpsc::sync_channel(config.max_queue_size);
        let max_queue_size = config.max_queue_size;

        let handle = thread::Builder::new()
            .name("tracepipe.BatchSpanProcessor".to_string())
            .spawn(move || {
                let mut worker = BatchWorker {
                    exporter,
                    batch: Vec::with_capacity(config.max_export_batch_size),
                    config,
                    last_export: Instant::now(),
                };
                loop {
                    let timeout = worker
                        .config
                        .scheduled_delay
                        .saturating_sub(worker.last_export.elapsed());
                    match message_receiver.recv_timeout(timeout) {
                        Ok(BatchMessage::ExportSpan(span)) => {
                            worker.batch.push(span);
                            if worker.batch.len() >= worker.config.max_export_batch_size {
                                worker.export();
                            }
                        }
                        Ok(BatchMessage::Flush(reply)) => {
                            let result = worker.export();
                            let _ = reply.send(result);
                        }
                        Ok(BatchMessage::Shutdown(reply)) => {
                            let result = worker.export();
                            worker.exporter.shutdown();
                            let _ = reply.send(result);
                            break;
                        }
                        Ok(BatchMessage::SetResource(resource)) => {
                            worker.exporter.set_resource(&resource);
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            worker.export();
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            // All handles gone without a shutdown call;
                            // flush what we have and stop.
                            worker.export();
                            worker.exporter.shutdown();
                            break;
                        }
                    }
                }
            })
            .ok();

        if handle.is_none() {
            tracing::error!(
                name: "BatchSpanProcessor.ThreadSpawnFailed",
                "failed to spawn batch export worker, spans will be dropped"
            );
        }

        BatchSpanProcessor {
            message_sender,
            handle: Mutex::new(handle),
            flush_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            is_shutdown: AtomicBool::new(false),
            dropped_spans: Arc::new(AtomicUsize::new(0)),
            max_queue_size,
        }
    }

    /// Start building a processor with a custom configuration.
    pub fn builder<E>(exporter: E) -> BatchSpanProcessorBuilder<E>
    where
        E: SpanExporter + 'static,
    {
        BatchSpanProcessorBuilder {
            exporter,
            config: BatchConfig::default(),
        }
    }

    /// How many spans have been dropped due to a full queue.
    pub fn dropped_span_count(&self) -> usize {
        self.dropped_spans.load(Ordering::Relaxed)
    }

    // Control messages share the span channel, so a full queue must not
    // fail them outright; retry until the worker drains or the deadline
    // passes.
    fn send_control(&self, mut message: BatchMessage, deadline: Instant) -> TraceResult<()> {
        loop {
            match self.message_sender.try_send(message) {
                Ok(()) => return Ok(()),
                Err(mpsc::TrySendError::Full(returned)) => {
                    if Instant::now() >= deadline {
                        return Err(TraceError::ExportTimedOut(self.flush_timeout));
                    }
                    message = returned;
                    thread::sleep(Duration::from_millis(10));
                }
                Err(mpsc::TrySendError::Disconnected(_)) => {
                    return Err(TraceError::Other(
                        "batch export worker is no longer running".to_string(),
                    ));
                }
            }
        }
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return;
        }
        if self
            .message_sender
            .try_send(BatchMessage::ExportSpan(span))
            .is_err()
        {
            let previous = self.dropped_spans.fetch_add(1, Ordering::Relaxed);
            if previous == 0 {
                tracing::warn!(
                    name: "BatchSpanProcessor.SpanDropped",
                    max_queue_size = self.max_queue_size,
                    "span queue full, dropping spans; this message is logged once per processor"
                );
            }
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        let deadline = Instant::now() + self.flush_timeout;
        let (reply_sender, reply_receiver) = mpsc::sync_channel(1);
        self.send_control(BatchMessage::Flush(reply_sender), deadline)?;
        reply_receiver
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .map_err(|_| TraceError::ExportTimedOut(self.flush_timeout))?
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> TraceResult<()> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        let dropped = self.dropped_spans.load(Ordering::Relaxed);
        if dropped > 0 {
            tracing::warn!(
                name: "BatchSpanProcessor.SpansDropped",
                dropped_spans = dropped,
                "spans were dropped due to a full queue"
            );
        }
        let deadline = Instant::now() + timeout;
        let (reply_sender, reply_receiver) = mpsc::sync_channel(1);
        self.send_control(BatchMessage::Shutdown(reply_sender), deadline)?;
        let result = reply_receiver
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .map_err(|_| TraceError::ExportTimedOut(timeout))?;
        // Only join once the worker has acknowledged; otherwise it may
        // still be stuck in a slow export and joining would hang.
        if let Ok(mut handle) = self.handle.lock() {
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
        result
    }

    fn set_resource(&mut self, resource: &Resource) {
        let _ = self
            .message_sender
            .try_send(BatchMessage::SetResource(Arc::new(resource.clone())));
    }
}

struct BatchWorker<E> {
    exporter: E,
    batch: Vec<SpanData>,
    config: BatchConfig,
    last_export: Instant,
}

impl<E: SpanExporter> BatchWorker<E> {
    fn export(&mut self) -> TraceResult<()> {
        self.last_export = Instant::now();
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = self.batch.split_off(0);
        let count = batch.len();
        let result = block_on(self.exporter.export(batch));
        if let Err(err) = &result {
            tracing::warn!(
                name: "BatchSpanProcessor.ExportError",
                error = %err,
                batch_size = count,
                "span batch export failed, batch dropped"
            );
        }
        result
    }
}

/// Builder for [`BatchSpanProcessor`].
#[derive(Debug)]
pub struct BatchSpanProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
}

impl<E> BatchSpanProcessorBuilder<E>
where
    E: SpanExporter + 'static,
{
    /// Use the given batching configuration.
    pub fn with_batch_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the processor, spawning its worker thread.
    pub fn build(self) -> BatchSpanProcessor {
        BatchSpanProcessor::new(self.exporter, self.config)
    }
}

/// Batch processing configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::default().build()
    }
}

impl BatchConfig {
    /// The queue bound beyond which spans are dropped.
    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// The maximum age of a batch before it is exported.
    pub fn scheduled_delay(&self) -> Duration {
        self.scheduled_delay
    }

    /// The batch size that triggers an immediate export.
    pub fn max_export_batch_size(&self) -> usize {
        self.max_export_batch_size
    }
}

/// Builder for [`BatchConfig`], seeded from the `TRACEPIPE_BSP_*`
/// environment variables when they are set.
#[derive(Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
}

impl Default for BatchConfigBuilder {
    /// Environment variables, when present and parseable, override the
    /// built-in defaults:
    ///
    /// * `TRACEPIPE_BSP_MAX_QUEUE_SIZE` (spans, default 2048)
    /// * `TRACEPIPE_BSP_SCHEDULE_DELAY` (milliseconds, default 5000)
    /// * `TRACEPIPE_BSP_MAX_EXPORT_BATCH_SIZE` (spans, default 512)
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            scheduled_delay: DEFAULT_SCHEDULE_DELAY,
            max_export_batch_size: DEFAULT_MAX_EXPORT_BATCH_SIZE,
        }
        .init_from_env_vars()
    }
}

impl BatchConfigBuilder {
    /// Set the queue bound beyond which spans are dropped.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the maximum age of a batch before it is exported.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Set the batch size that triggers an immediate export.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Build the configuration. The batch size is clamped to the queue
    /// size.
    pub fn build(self) -> BatchConfig {
        let max_export_batch_size = self.max_export_batch_size.min(self.max_queue_size);
        BatchConfig {
            max_queue_size: self.max_queue_size,
            scheduled_delay: self.scheduled_delay,
            max_export_batch_size,
        }
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Some(max_queue_size) = std::env::var(ENV_MAX_QUEUE_SIZE)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            self.max_queue_size = max_queue_size;
        }
        if let Some(scheduled_delay) = std::env::var(ENV_SCHEDULE_DELAY)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            self.scheduled_delay = Duration::from_millis(scheduled_delay);
        }
        if let Some(max_export_batch_size) = std::env::var(ENV_MAX_EXPORT_BATCH_SIZE)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            self.max_export_batch_size = max_export_batch_size;
        }
        self
    }
}
