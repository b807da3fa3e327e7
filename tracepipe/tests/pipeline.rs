//! End to end tests exercising the full pipeline: spans through the
//! batch processor, metrics through the periodic reader, propagation
//! across a simulated process boundary, and correlated logs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracepipe::logs::{
    InMemoryLogHandler, LogHandler, LogRecord, Severity, TraceCorrelationHandler, SPAN_ID_KEY,
    TRACE_ID_KEY,
};
use tracepipe::metrics::data::MetricData;
use tracepipe::metrics::InMemoryMetricExporter;
use tracepipe::propagation::TextMapPropagator;
use tracepipe::trace::{InMemorySpanExporter, SpanId, Status};
use tracepipe::{Context, Error, KeyValue, TelemetryProvider, TraceError, Value};

fn provider_with(
    span_exporter: InMemorySpanExporter,
    metric_exporter: InMemoryMetricExporter,
) -> TelemetryProvider {
    TelemetryProvider::builder()
        .with_service_name("pipeline-test")
        .with_span_exporter(span_exporter)
        .with_metric_exporter(metric_exporter)
        .build()
        .expect("both exporters are configured")
}

#[test]
fn spans_flow_through_batch_export_on_shutdown() {
    let span_exporter = InMemorySpanExporter::new();
    let provider = provider_with(span_exporter.clone(), InMemoryMetricExporter::new());
    let tracer = provider.tracer();

    let (cx, mut parent) = tracer.start(&Context::new(), "handle-request");
    let (_child_cx, mut child) = tracer.start(&cx, "query-db");
    child.set_status(Status::Ok);
    child.end();
    parent.set_status(Status::Ok);
    parent.end();

    provider.shutdown(Duration::from_secs(10)).unwrap();

    let spans = span_exporter.finished_spans();
    assert_eq!(spans.len(), 2);
    let parent_data = spans.iter().find(|s| s.name == "handle-request").unwrap();
    let child_data = spans.iter().find(|s| s.name == "query-db").unwrap();
    assert_eq!(
        child_data.span_context.trace_id(),
        parent_data.span_context.trace_id()
    );
    assert_eq!(child_data.parent_span_id, parent_data.span_context.span_id());
    assert_eq!(parent_data.parent_span_id, SpanId::INVALID);
}

#[test]
fn concurrent_counter_adds_are_exact() {
    let metric_exporter = InMemoryMetricExporter::new();
    let provider = provider_with(InMemorySpanExporter::new(), metric_exporter.clone());
    let counter = provider
        .meter()
        .counter("requests.total")
        .with_unit("{request}")
        .build()
        .unwrap();

    let threads = 8u32;
    let adds_per_thread = 1_000u64;
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let counter = counter.clone();
            thread::spawn(move || {
                let attrs = [KeyValue::new("worker", i64::from(i % 2))];
                for _ in 0..adds_per_thread {
                    counter.add(1, &attrs);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    provider.shutdown(Duration::from_secs(10)).unwrap();
    let exports = metric_exporter.exported_metrics();
    let last = exports.last().unwrap();
    let MetricData::Sum(sum) = &last.metrics[0].data else {
        panic!("expected a sum");
    };
    let total: u64 = sum.data_points.iter().map(|p| p.value).sum();
    assert_eq!(total, u64::from(threads) * adds_per_thread);
}

#[test]
fn histogram_and_gauge_reach_the_exporter() {
    let metric_exporter = InMemoryMetricExporter::new();
    let provider = provider_with(InMemorySpanExporter::new(), metric_exporter.clone());
    let meter = provider.meter();

    let latency = meter
        .histogram("request.duration")
        .with_unit("s")
        .build()
        .unwrap();
    latency.record(0.05, &[]);
    latency.record(0.3, &[]);
    latency.record(7.0, &[]);

    let depth = Arc::new(AtomicU64::new(12));
    let observed = depth.clone();
    meter
        .observable_gauge("queue.depth")
        .with_callback(move |observer| {
            observer.observe(observed.load(Ordering::Relaxed) as f64, &[]);
        })
        .build()
        .unwrap();

    provider.shutdown(Duration::from_secs(10)).unwrap();

    let exports = metric_exporter.exported_metrics();
    let last = exports.last().unwrap();
    let histogram = last
        .metrics
        .iter()
        .find(|m| m.name == "request.duration")
        .unwrap();
    let MetricData::Histogram(histogram) = &histogram.data else {
        panic!("expected a histogram");
    };
    let point = &histogram.data_points[0];
    assert_eq!(point.count, 3);
    // Default bounds are [0.1, 0.5, 1, 2, 5].
    assert_eq!(point.bucket_counts, vec![1, 1, 0, 0, 0, 1]);

    let gauge = last.metrics.iter().find(|m| m.name == "queue.depth").unwrap();
    let MetricData::Gauge(gauge) = &gauge.data else {
        panic!("expected a gauge");
    };
    assert_eq!(gauge.data_points[0].value, 12.0);
}

#[test]
fn context_survives_a_simulated_process_boundary() {
    let span_exporter = InMemorySpanExporter::new();
    let provider = provider_with(span_exporter.clone(), InMemoryMetricExporter::new());
    let tracer = provider.tracer();

    // Client side: start a span and inject its context into headers.
    let (client_cx, mut client_span) = tracer.start(&Context::new(), "client-call");
    let mut headers: HashMap<String, String> = HashMap::new();
    provider.propagator().inject_context(&client_cx, &mut headers);

    // Server side: extract and continue the trace.
    let server_cx = provider.propagator().extract(&headers);
    let remote = server_cx.span_context().unwrap();
    assert!(remote.is_remote());
    let (_cx, mut server_span) = tracer.start(&server_cx, "server-handle");
    server_span.end();
    client_span.end();

    provider.shutdown(Duration::from_secs(10)).unwrap();

    let spans = span_exporter.finished_spans();
    let client = spans.iter().find(|s| s.name == "client-call").unwrap();
    let server = spans.iter().find(|s| s.name == "server-handle").unwrap();
    assert_eq!(
        server.span_context.trace_id(),
        client.span_context.trace_id()
    );
    assert_eq!(server.parent_span_id, client.span_context.span_id());
}

#[test]
fn logs_are_correlated_with_the_active_span() {
    let span_exporter = InMemorySpanExporter::new();
    let provider = provider_with(span_exporter.clone(), InMemoryMetricExporter::new());
    let sink = InMemoryLogHandler::new();
    let handler = TraceCorrelationHandler::new(Box::new(sink.clone()));

    let (cx, mut span) = provider.tracer().start(&Context::new(), "charge");
    handler.handle(&cx, LogRecord::new(Severity::Info, "charging card"));
    let span_context = span.span_context().clone();
    span.end();
    provider.shutdown(Duration::from_secs(10)).unwrap();

    let records = sink.emitted_records();
    let trace_id = records[0]
        .attributes
        .iter()
        .find(|kv| kv.key == TRACE_ID_KEY)
        .unwrap();
    let span_id = records[0]
        .attributes
        .iter()
        .find(|kv| kv.key == SPAN_ID_KEY)
        .unwrap();
    assert_eq!(
        trace_id.value,
        Value::from(span_context.trace_id().to_string())
    );
    assert_eq!(span_id.value, Value::from(span_context.span_id().to_string()));
}

#[derive(Debug)]
struct AlwaysFailingSpanExporter;

impl tracepipe::trace::SpanExporter for AlwaysFailingSpanExporter {
    fn export(
        &mut self,
        _batch: Vec<tracepipe::trace::SpanData>,
    ) -> futures_util::future::BoxFuture<'static, tracepipe::TraceResult<()>> {
        Box::pin(async { Err(TraceError::ExportFailed("backend down".to_string())) })
    }
}

#[test]
fn shutdown_is_bounded_and_reaches_metrics_despite_span_failure() {
    let metric_exporter = InMemoryMetricExporter::new();
    let provider = TelemetryProvider::builder()
        .with_span_exporter(AlwaysFailingSpanExporter)
        .with_metric_exporter(metric_exporter.clone())
        .build()
        .unwrap();

    let (_cx, mut span) = provider.tracer().start(&Context::new(), "doomed");
    span.end();
    provider.meter().counter("survivors").build().unwrap();

    let started = Instant::now();
    let errors = provider.shutdown(Duration::from_secs(5)).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(5));

    // The span stage failed, but the metric stage still ran.
    assert!(errors
        .iter()
        .any(|e| matches!(e, Error::Trace(TraceError::ExportFailed(_)))));
    assert_eq!(metric_exporter.exported_metrics().len(), 1);
}
