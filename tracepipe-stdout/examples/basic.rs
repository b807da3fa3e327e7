//! Runs the full pipeline against the stdout exporters: a small trace,
//! a few metrics and a correlated log line.

use std::time::Duration;

use tracepipe::logs::{LogHandler, LogRecord, Severity, TraceCorrelationHandler};
use tracepipe::{Context, KeyValue, TelemetryProvider};
use tracepipe_stdout::{MetricExporter, SpanExporter, StdoutLogHandler};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let provider = TelemetryProvider::builder()
        .with_service_name("stdout-demo")
        .with_service_version("0.1.0")
        .with_environment("development")
        .with_span_exporter(SpanExporter::new())
        .with_metric_exporter(MetricExporter::new())
        .with_metric_interval(Duration::from_secs(1))
        .build()?;

    let tracer = provider.tracer();
    let meter = provider.meter();
    let log = TraceCorrelationHandler::new(Box::new(StdoutLogHandler::new()));

    let requests = meter
        .counter("requests.total")
        .with_description("Handled requests")
        .with_unit("{request}")
        .build()?;
    let latency = meter
        .histogram("request.duration")
        .with_unit("s")
        .build()?;
    meter
        .observable_gauge("queue.depth")
        .with_callback(|observer| observer.observe(3.0, &[]))
        .build()?;

    let (cx, mut span) = tracer.start(&Context::new(), "handle-request");
    span.set_attribute(KeyValue::new("http.route", "/articles"));
    log.handle(
        &cx,
        LogRecord::new(Severity::Info, "listing articles")
            .with_attributes([KeyValue::new("limit", 20)]),
    );

    let (_db_cx, mut db_span) = tracer.start(&cx, "query-articles");
    std::thread::sleep(Duration::from_millis(25));
    db_span.end();

    requests.add(1, &[KeyValue::new("status", "ok")]);
    latency.record(0.025, &[KeyValue::new("status", "ok")]);
    span.end();

    provider
        .shutdown(Duration::from_secs(5))
        .map_err(|mut errors| errors.remove(0))?;
    Ok(())
}
