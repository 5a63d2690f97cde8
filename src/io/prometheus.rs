//! Prometheus metrics HTTP endpoint
//!
//! Exposes geofence metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_throughput_metrics(&mut output, site_id, &summary);
    write_transition_metrics(&mut output, site_id, &summary);
    write_fault_metrics(&mut output, site_id, &summary);

    output
}

fn write_throughput_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "geofence_records_total",
        "Telemetry records processed",
        MetricType::Counter,
        site,
        summary.records_total,
    );
    let _ = writeln!(output, "# HELP geofence_records_per_sec Records processed per second");
    let _ = writeln!(output, "# TYPE geofence_records_per_sec gauge");
    let _ = writeln!(
        output,
        "geofence_records_per_sec{{site=\"{site}\"}} {:.2}",
        summary.records_per_sec
    );
    write_metric(
        output,
        "geofence_zones_evaluated_total",
        "Zones evaluated",
        MetricType::Counter,
        site,
        summary.zones_evaluated,
    );
    write_histogram(
        output,
        "geofence_record_latency_us",
        "Per-record processing latency in microseconds",
        site,
        &summary.lat_buckets,
        &METRICS_BUCKET_BOUNDS,
        summary.avg_process_latency_us,
    );
    write_metric(
        output,
        "geofence_record_latency_p99_us",
        "99th percentile per-record latency",
        MetricType::Gauge,
        site,
        summary.lat_p99_us,
    );
}

fn write_transition_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    let name = "geofence_transitions_total";
    let _ = writeln!(output, "# HELP {name} Persisted containment transitions");
    let _ = writeln!(output, "# TYPE {name} counter");
    let _ = writeln!(
        output,
        "{name}{{site=\"{site}\",state=\"inside\"}} {}",
        summary.transitions_inside
    );
    let _ = writeln!(
        output,
        "{name}{{site=\"{site}\",state=\"outside\"}} {}",
        summary.transitions_outside
    );
}

fn write_fault_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    let counters: [(&str, &str, u64); 9] = [
        ("geofence_malformed_zones_total", "Zones rejected as malformed", summary.malformed_zones),
        (
            "geofence_unsupported_zones_total",
            "Zones with an unknown shape code",
            summary.unsupported_zones,
        ),
        (
            "geofence_undefined_centers_total",
            "Circular zones evaluated without a center",
            summary.undefined_centers,
        ),
        ("geofence_persist_failures_total", "Transitions not persisted", summary.persist_failures),
        (
            "geofence_units_without_zones_total",
            "Records for units with no zones",
            summary.units_without_zones,
        ),
        ("geofence_upstream_failures_total", "Source unavailable errors", summary.upstream_failures),
        ("geofence_decode_failures_total", "Telemetry rows skipped", summary.decode_failures),
        ("geofence_records_dropped_total", "Records dropped on full queue", summary.records_dropped),
        ("geofence_egress_dropped_total", "Transitions not broadcast", summary.egress_dropped),
    ];
    for (name, help, val) in counters {
        write_metric(output, name, help, MetricType::Counter, site, val);
    }
}

fn text_response(status: StatusCode, content_type: &str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    if let Ok(value) = content_type.parse() {
        response.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => text_response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&metrics, &site_id),
        ),
        (&Method::GET, "/health") => text_response(StatusCode::OK, "text/plain", "ok".to_string()),
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", "not found".to_string()),
    };
    Ok(response)
}

/// Serve /metrics and /health until shutdown
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, metrics, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
