use crate::{AppState, StagedLease};
use crate::api::error::MediaError;
use crate::models::{LocalBlob, RemoteFile};
use crate::services::preview::PreviewKind;
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize)]
pub struct StagedObjectResponse {
    pub id: Uuid,
    pub url: String,
    pub name: String,
    pub size: usize,
    pub content_type: Option<String>,
    pub kind: PreviewKind,
}

/// Stages the first file part of a multipart body and mints an object URL
/// for it. The URL stays live until `DELETE /objects/:id`.
pub async fn stage_object(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<StagedObjectResponse>), MediaError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| MediaError::BadRequest(e.to_string()))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let declared_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| MediaError::BadRequest(e.to_string()))?;

        if data.len() > state.config.max_file_size {
            return Err(MediaError::PayloadTooLarge(format!(
                "File too large. Max: {} bytes",
                state.config.max_file_size
            )));
        }

        let mut blob = LocalBlob::new(file_name, data);
        if blob.content_type.is_none() {
            blob.content_type = declared_type;
        }

        let handle = state.media.urls.acquire(&blob);
        let id = handle
            .object_id()
            .ok_or_else(|| MediaError::Internal("Owned handle without object id".to_string()))?;
        let response = StagedObjectResponse {
            id,
            url: handle.url().to_string(),
            name: blob.name.clone(),
            size: blob.size(),
            kind: PreviewKind::from_content_type(blob.content_type.as_deref()),
            content_type: blob.content_type,
        };
        state.leases.insert(id, StagedLease::new(handle));
        tracing::info!("📎 Staged {} as {}", response.name, response.url);

        return Ok((StatusCode::CREATED, Json(response)));
    }

    Err(MediaError::BadRequest("No file in request".to_string()))
}

pub async fn get_object(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, MediaError> {
    let blob = state
        .media
        .urls
        .resolve(&id)
        .ok_or_else(|| MediaError::NotFound(format!("Object URL {} is not live", id)))?;

    let content_type = blob
        .content_type
        .clone()
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        blob.data,
    )
        .into_response())
}

pub async fn revoke_object(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, MediaError> {
    if !state.release_lease(&id) {
        return Err(MediaError::NotFound(format!(
            "Object URL {} is not staged",
            id
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct PersistObjectRequest {
    pub prefix: String,
    /// Storage path of the file this one replaces, deleted best-effort.
    pub replaces: Option<String>,
}

/// Uploads a staged blob. The object URL is revoked only after the upload
/// succeeds, so a failed attempt can be retried from the same lease.
///
/// The upload runs on its own task: a client that disconnects mid-request
/// only loses the response.
pub async fn persist_object(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PersistObjectRequest>,
) -> Result<Json<RemoteFile>, MediaError> {
    let blob = state
        .media
        .urls
        .resolve(&id)
        .ok_or_else(|| MediaError::NotFound(format!("Object URL {} is not live", id)))?;

    let task = tokio::spawn(async move {
        let transport = &state.media.transport;
        let uploaded = match req.replaces.as_deref() {
            Some(old_path) => transport.replace(old_path, blob, &req.prefix).await?,
            None => transport.upload(blob, &req.prefix).await?,
        };
        state.release_lease(&id);
        Ok::<_, MediaError>(RemoteFile::from(uploaded))
    });

    let remote = task
        .await
        .map_err(|e| MediaError::Internal(format!("Persist task failed: {}", e)))??;
    Ok(Json(remote))
}
