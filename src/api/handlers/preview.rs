use crate::AppState;
use crate::api::error::MediaError;
use crate::services::object_urls::PreviewHandle;
use crate::services::preview::{PreviewKind, PreviewPayload, PreviewSnapshot};
use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct OpenPreviewRequest {
    pub url: String,
    pub kind: Option<PreviewKind>,
    pub title: Option<String>,
}

pub async fn current_preview(State(state): State<AppState>) -> Json<Option<PreviewSnapshot>> {
    Json(state.media.previews.current())
}

/// Opens a URL in the preview modal. Staged object URLs stay owned by their
/// lease, so the modal only borrows them.
pub async fn open_preview(
    State(state): State<AppState>,
    Json(req): Json<OpenPreviewRequest>,
) -> Result<Json<PreviewSnapshot>, MediaError> {
    if req.url.trim().is_empty() {
        return Err(MediaError::BadRequest("url must not be empty".to_string()));
    }

    let kind = req.kind.unwrap_or_else(|| {
        let staged = state.media.urls.resolve_url(&req.url);
        PreviewKind::from_content_type(staged.as_ref().and_then(|b| b.content_type.as_deref()))
    });

    let payload = PreviewPayload {
        kind,
        title: req.title,
        handle: PreviewHandle::borrowed(req.url),
    };
    let snapshot = PreviewSnapshot::from(&payload);
    state.media.previews.open(payload);
    Ok(Json(snapshot))
}

pub async fn close_preview(State(state): State<AppState>) -> StatusCode {
    state.media.previews.close();
    StatusCode::NO_CONTENT
}
