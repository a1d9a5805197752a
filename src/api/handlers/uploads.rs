use crate::AppState;
use crate::services::upload_coordinator::UploadActivity;
use axum::{Json, extract::State};

pub async fn upload_status(State(state): State<AppState>) -> Json<UploadActivity> {
    Json(state.media.coordinator.snapshot())
}
