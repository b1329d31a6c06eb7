//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "annai_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "annai_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "annai_http_requests_in_flight";

    // Pipeline metrics
    pub const UPLOADS_TOTAL: &str = "annai_uploads_total";
    pub const PIPELINE_DURATION_SECONDS: &str = "annai_pipeline_duration_seconds";
    pub const SEGMENTS_TOTAL: &str = "annai_segments_total";
    pub const MCQS_GENERATED_TOTAL: &str = "annai_mcqs_generated_total";
    pub const MCQ_SENTINELS_TOTAL: &str = "annai_mcq_sentinels_total";
    pub const SEGMENTS_SKIPPED_TOTAL: &str = "annai_segments_skipped_total";
    pub const UPSTREAM_FAILURES_TOTAL: &str = "annai_upstream_failures_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "annai_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a finished upload pipeline run.
pub fn record_upload(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::UPLOADS_TOTAL, &labels).increment(1);
    histogram!(names::PIPELINE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_segments(count: usize) {
    counter!(names::SEGMENTS_TOTAL).increment(count as u64);
}

pub fn record_mcqs_generated(backend: &str, count: usize) {
    let labels = [("backend", backend.to_string())];
    counter!(names::MCQS_GENERATED_TOTAL, &labels).increment(count as u64);
}

pub fn record_sentinel(backend: &str) {
    let labels = [("backend", backend.to_string())];
    counter!(names::MCQ_SENTINELS_TOTAL, &labels).increment(1);
}

pub fn record_segment_skipped(backend: &str) {
    let labels = [("backend", backend.to_string())];
    counter!(names::SEGMENTS_SKIPPED_TOTAL, &labels).increment(1);
}

/// Record a failed call to the transcription or generation service.
pub fn record_upstream_failure(service: &str, kind: &str) {
    let labels = [("service", service.to_string()), ("kind", kind.to_string())];
    counter!(names::UPSTREAM_FAILURES_TOTAL, &labels).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Label for a request path: the route template when one matched.
fn route_label(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string())
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = route_label(&request);
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
