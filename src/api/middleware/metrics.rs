use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};

/// One `request_completed` line per request, tagged with upload activity so
/// slow responses can be read against in-flight transfers.
pub async fn metrics_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_millis();
    let activity = state.media.coordinator.snapshot();
    let live_urls = state.media.urls.stats().live;

    if response.status().is_server_error() {
        warn!(
            target: "metrics",
            method = %method,
            path = %path,
            status,
            latency_ms = %latency_ms,
            active_uploads = activity.active_jobs,
            "request_failed"
        );
    } else {
        info!(
            target: "metrics",
            method = %method,
            path = %path,
            status,
            latency_ms = %latency_ms,
            active_uploads = activity.active_jobs,
            live_object_urls = live_urls,
            "request_completed"
        );
    }

    response
}
