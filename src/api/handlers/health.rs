use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
    pub live_object_urls: usize,
    pub active_uploads: usize,
    pub version: String,
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        storage: state.config.storage_backend.as_str().to_string(),
        live_object_urls: state.media.urls.stats().live,
        active_uploads: state.media.coordinator.snapshot().active_jobs,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
