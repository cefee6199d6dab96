use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::metrics::{Sample, SampleRecorder};

/// Wraps every request: measures wall-clock time from entry to exit of
/// the inner service and hands a sample to the recorder once the
/// response exists, success or error.
///
/// Recording is fire-and-forget: a panic inside the recorder is caught
/// and logged, and can never alter the response already produced.
///
/// Also adds two response headers:
///
///   X-Response-Time-Us  — total handler wall time in microseconds
///   Server-Timing       — same value in the standard Server-Timing format
pub async fn track_request(
    State(recorder): State<Arc<SampleRecorder>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    // The route template, not the literal URL: bounds key cardinality
    // no matter how many distinct ids are requested.
    let template = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned());

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();
    let duration_ms = elapsed.as_secs_f64() * 1000.0;

    // ── Inject response headers ─────────────────────────────────
    if let Ok(val) = elapsed.as_micros().to_string().parse() {
        response.headers_mut().insert("X-Response-Time-Us", val);
    }
    let server_timing = format!("total;dur={duration_ms:.3}");
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("Server-Timing", val);
    }

    let status = response.status().as_u16();
    debug!(
        %method,
        %path,
        status,
        duration_us = elapsed.as_micros() as u64,
        "request completed"
    );

    // ── Record against the route template ───────────────────────
    if let Some(template) = template.filter(|t| is_instrumented(t)) {
        let sample = Sample::new(format!("{method} {template}"), duration_ms);
        if catch_unwind(AssertUnwindSafe(|| recorder.record(sample))).is_err() {
            warn!(%method, %path, "failed to record request sample");
        }
    }

    response
}

/// Business API routes only. The monitoring surface and the health
/// probe would skew the very statistics they exist to serve, and
/// static assets are not API traffic.
fn is_instrumented(template: &str) -> bool {
    template.starts_with("/api/")
        && !template.starts_with("/api/admin")
        && template != "/api/health"
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{self, StatusCode};
    use axum::routing::get;
    use axum::{middleware, Router};
    use tower::ServiceExt;

    fn test_app(recorder: Arc<SampleRecorder>) -> Router {
        Router::new()
            .route("/api/transactions/:id", get(|| async { "ok" }))
            .route("/api/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/api/admin/metrics", get(|| async { "ok" }))
            .route("/api/health", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(recorder, track_request))
    }

    async fn hit(app: &Router, uri: &str) -> http::Response<Body> {
        app.clone()
            .oneshot(
                http::Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response")
    }

    #[tokio::test]
    async fn records_route_template_not_literal_path() {
        let recorder = Arc::new(SampleRecorder::new());
        let app = test_app(Arc::clone(&recorder));

        let response = hit(&app, "/api/transactions/41").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("X-Response-Time-Us"));
        hit(&app, "/api/transactions/42").await;

        let keys = recorder.endpoint_keys();
        assert_eq!(keys, vec!["GET /api/transactions/:id"]);
        let window = recorder.snapshot("GET /api/transactions/:id").expect("window");
        assert_eq!(window.total_count, 2);
    }

    #[tokio::test]
    async fn error_responses_are_recorded_too() {
        let recorder = Arc::new(SampleRecorder::new());
        let app = test_app(Arc::clone(&recorder));

        let response = hit(&app, "/api/broken").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let window = recorder.snapshot("GET /api/broken").expect("window");
        assert_eq!(window.total_count, 1);
    }

    #[tokio::test]
    async fn monitoring_and_health_routes_are_excluded() {
        let recorder = Arc::new(SampleRecorder::new());
        let app = test_app(Arc::clone(&recorder));

        hit(&app, "/api/admin/metrics").await;
        hit(&app, "/api/health").await;

        assert!(recorder.endpoint_keys().is_empty());
    }

    #[test]
    fn instrumented_prefix_rules() {
        assert!(is_instrumented("/api/transactions/:id"));
        assert!(is_instrumented("/api/sessions"));
        assert!(!is_instrumented("/api/admin/metrics/stream"));
        assert!(!is_instrumented("/api/health"));
        assert!(!is_instrumented("/dashboard/index.html"));
    }
}
