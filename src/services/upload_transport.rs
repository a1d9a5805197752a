use crate::api::error::MediaError;
use crate::models::{LocalBlob, UploadEvent, UploadedObject};
use crate::services::storage::StorageService;
use crate::services::upload_coordinator::UploadCoordinator;
use crate::utils::object_key::ObjectKeyGenerator;
use async_stream::try_stream;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use std::sync::Arc;
use tokio::sync::mpsc;

pub const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024;
pub const DEFAULT_MAX_FILE_SIZE: usize = 256 * 1024 * 1024;

/// Outcome of a sequential batch upload, one entry per input blob in order.
#[derive(Debug)]
pub struct BatchOutcome {
    results: Vec<Result<UploadedObject, MediaError>>,
}

impl BatchOutcome {
    pub fn results(&self) -> &[Result<UploadedObject, MediaError>] {
        &self.results
    }

    pub fn into_results(self) -> Vec<Result<UploadedObject, MediaError>> {
        self.results
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.results
            .iter()
            .enumerate()
            .filter(|(_, result)| result.is_err())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn uploaded(&self) -> impl Iterator<Item = (usize, &UploadedObject)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(index, result)| result.as_ref().ok().map(|object| (index, object)))
    }

    pub fn is_complete(&self) -> bool {
        self.results.iter().all(Result::is_ok)
    }
}

/// Moves blobs into remote storage, reporting every job to the coordinator.
///
/// Storage writes run on spawned tasks: a caller that stops listening
/// discards the result, it does not cancel the upload.
#[derive(Clone)]
pub struct UploadTransport {
    storage: Arc<dyn StorageService>,
    coordinator: UploadCoordinator,
    keys: Arc<ObjectKeyGenerator>,
    part_size: usize,
    max_file_size: usize,
}

impl UploadTransport {
    pub fn new(storage: Arc<dyn StorageService>, coordinator: UploadCoordinator) -> Self {
        Self {
            storage,
            coordinator,
            keys: Arc::new(ObjectKeyGenerator::new()),
            part_size: DEFAULT_PART_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Blobs larger than this are sent as multipart uploads.
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    pub fn with_max_file_size(mut self, max_file_size: usize) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn coordinator(&self) -> &UploadCoordinator {
        &self.coordinator
    }

    /// Lazy upload of one blob under `prefix`.
    ///
    /// Nothing happens until the stream is polled; from then on the upload
    /// runs to completion even if the stream is dropped. Progress values never
    /// decrease; a successful stream ends with `Progress(1.0)` followed by
    /// `Completed`, a failed one with a single error.
    pub fn upload_with_progress(
        &self,
        blob: LocalBlob,
        prefix: &str,
    ) -> impl Stream<Item = Result<UploadEvent, MediaError>> + Send + 'static {
        let storage = self.storage.clone();
        let coordinator = self.coordinator.clone();
        let keys = self.keys.clone();
        let prefix = prefix.to_string();
        let part_size = self.part_size;
        let max_file_size = self.max_file_size;

        try_stream! {
            let job = coordinator.begin_job();
            check_size(&blob, max_file_size)?;
            let key = keys.object_key(&prefix, &blob.name);
            tracing::info!("⬆️  Uploading {} ({} bytes) to {}", blob.name, blob.size(), key);

            let (tx, mut rx) = mpsc::unbounded_channel();
            tokio::spawn(async move {
                let events = put_blob(storage, key, blob, part_size);
                pin_mut!(events);
                let mut outcome = None;
                while let Some(event) = events.next().await {
                    match event {
                        Ok(UploadEvent::Progress(fraction)) => {
                            job.report(fraction);
                            // Nobody listening: keep uploading.
                            let _ = tx.send(Ok(UploadEvent::Progress(fraction)));
                        }
                        other => {
                            outcome = Some(other);
                            break;
                        }
                    }
                }
                // The job ends before the caller sees the outcome.
                job.finish();
                if let Some(outcome) = outcome {
                    let _ = tx.send(outcome);
                }
            });

            yield UploadEvent::Progress(0.0);
            while let Some(event) = rx.recv().await {
                yield event?;
            }
        }
    }

    pub async fn upload(&self, blob: LocalBlob, prefix: &str) -> Result<UploadedObject, MediaError> {
        let name = blob.name.clone();
        let events = self.upload_with_progress(blob, prefix);
        pin_mut!(events);
        while let Some(event) = events.next().await {
            if let UploadEvent::Completed(object) = event? {
                return Ok(object);
            }
        }
        Err(MediaError::Internal(format!(
            "Upload of {} ended without a result",
            name
        )))
    }

    /// Deletes `old_path`, then uploads `blob`. The delete is best-effort: a
    /// failure is logged and the upload proceeds.
    pub async fn replace(
        &self,
        old_path: &str,
        blob: LocalBlob,
        prefix: &str,
    ) -> Result<UploadedObject, MediaError> {
        self.discard(old_path).await;
        self.upload(blob, prefix).await
    }

    /// Best-effort delete; returns whether storage accepted it.
    pub async fn discard(&self, path: &str) -> bool {
        match self.storage.delete_object(path).await {
            Ok(()) => {
                tracing::info!("🗑️  Deleted replaced object {}", path);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to delete replaced object {}: {}", path, e);
                false
            }
        }
    }

    /// Uploads `blobs` strictly one after another under a single coordinator
    /// job. A failure neither rolls back earlier uploads nor stops later ones.
    ///
    /// The batch runs on its own task and completes even if the returned
    /// future is dropped.
    pub async fn upload_many(&self, blobs: Vec<LocalBlob>, prefix: &str) -> BatchOutcome {
        let count = blobs.len();
        let transport = self.clone();
        let prefix = prefix.to_string();
        let batch = tokio::spawn(async move { transport.run_batch(blobs, &prefix).await });

        match batch.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Batch upload task failed: {}", e);
                BatchOutcome {
                    results: (0..count)
                        .map(|_| Err(MediaError::Internal(format!("Batch upload task failed: {}", e))))
                        .collect(),
                }
            }
        }
    }

    async fn run_batch(&self, blobs: Vec<LocalBlob>, prefix: &str) -> BatchOutcome {
        let job = self.coordinator.begin_job();
        let total = blobs.len().max(1) as f64;
        let mut results = Vec::with_capacity(blobs.len());

        for (index, blob) in blobs.into_iter().enumerate() {
            let name = blob.name.clone();
            let result = self
                .upload_one(blob, prefix, |fraction| {
                    job.report((index as f64 + fraction) / total)
                })
                .await;

            if let Err(e) = &result {
                tracing::warn!("Batch item {} ({}) failed: {}", index, name, e);
            }
            results.push(result);
        }

        job.finish();
        let outcome = BatchOutcome { results };
        tracing::info!(
            "Batch upload to {} finished: {} uploaded, failed items {:?}",
            prefix,
            outcome.uploaded().count(),
            outcome.failed_indices()
        );
        outcome
    }

    pub async fn delete(&self, path: &str) -> Result<(), MediaError> {
        self.storage
            .delete_object(path)
            .await
            .map_err(|e| MediaError::transport(path, e))
    }

    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, MediaError> {
        self.storage
            .list_objects(prefix)
            .await
            .map_err(|e| MediaError::transport(prefix, e))
    }

    async fn upload_one(
        &self,
        blob: LocalBlob,
        prefix: &str,
        on_progress: impl Fn(f64),
    ) -> Result<UploadedObject, MediaError> {
        check_size(&blob, self.max_file_size)?;
        let key = self.keys.object_key(prefix, &blob.name);
        let events = put_blob(self.storage.clone(), key.clone(), blob, self.part_size);
        pin_mut!(events);
        while let Some(event) = events.next().await {
            match event? {
                UploadEvent::Progress(fraction) => on_progress(fraction),
                UploadEvent::Completed(object) => return Ok(object),
            }
        }
        Err(MediaError::Internal(format!(
            "Upload to {} ended without a result",
            key
        )))
    }
}

fn check_size(blob: &LocalBlob, max_file_size: usize) -> Result<(), MediaError> {
    if blob.size() > max_file_size {
        return Err(MediaError::PayloadTooLarge(format!(
            "{} is {} bytes. Max: {} bytes",
            blob.name,
            blob.size(),
            max_file_size
        )));
    }
    Ok(())
}

async fn abort_quietly(storage: &dyn StorageService, key: &str, upload_id: &str) {
    if let Err(e) = storage.abort_multipart_upload(key, upload_id).await {
        tracing::warn!("Failed to abort multipart upload {} for {}: {}", upload_id, key, e);
    }
}

/// An open multipart upload. Dropped while still armed, it aborts the upload
/// on a spawned task so storage never keeps orphaned parts.
struct PendingMultipart {
    storage: Arc<dyn StorageService>,
    key: String,
    upload_id: String,
    armed: bool,
}

impl PendingMultipart {
    fn new(storage: Arc<dyn StorageService>, key: &str, upload_id: &str) -> Self {
        Self {
            storage,
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingMultipart {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(
            "Multipart upload {} for {} dropped before completion, aborting",
            self.upload_id,
            self.key
        );
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!("No runtime to abort multipart upload {}", self.upload_id);
            return;
        };
        let storage = self.storage.clone();
        let key = std::mem::take(&mut self.key);
        let upload_id = std::mem::take(&mut self.upload_id);
        runtime.spawn(async move {
            abort_quietly(storage.as_ref(), &key, &upload_id).await;
        });
    }
}

/// Storage writes for one blob, without coordinator bookkeeping.
fn put_blob(
    storage: Arc<dyn StorageService>,
    key: String,
    blob: LocalBlob,
    part_size: usize,
) -> impl Stream<Item = Result<UploadEvent, MediaError>> + Send + 'static {
    try_stream! {
        let content_type = blob.content_type.clone();
        let total = blob.size();

        if total <= part_size {
            storage
                .put_object(&key, blob.data.clone(), content_type.as_deref())
                .await
                .map_err(|e| MediaError::transport(&key, e))?;
            yield UploadEvent::Progress(1.0);
        } else {
            let upload_id = storage
                .create_multipart_upload(&key, content_type.as_deref())
                .await
                .map_err(|e| MediaError::transport(&key, e))?;

            let mut pending = PendingMultipart::new(storage.clone(), &key, &upload_id);

            let mut parts = Vec::new();
            let mut offset = 0;
            let mut part_number = 1;
            while offset < total {
                let end = (offset + part_size).min(total);
                let chunk = blob.data.slice(offset..end);
                match storage.upload_part(&key, &upload_id, part_number, chunk).await {
                    Ok(etag) => parts.push((part_number, etag)),
                    Err(e) => {
                        pending.disarm();
                        abort_quietly(storage.as_ref(), &key, &upload_id).await;
                        Err::<(), _>(MediaError::transport(&key, e))?;
                    }
                }
                offset = end;
                part_number += 1;
                yield UploadEvent::Progress(offset as f64 / total as f64);
            }

            let completed = storage
                .complete_multipart_upload(&key, &upload_id, parts)
                .await;
            pending.disarm();
            if let Err(e) = completed {
                abort_quietly(storage.as_ref(), &key, &upload_id).await;
                Err::<(), _>(MediaError::transport(&key, e))?;
            }
        }

        tracing::info!("✅ Stored {} ({} bytes)", key, total);
        yield UploadEvent::Completed(UploadedObject {
            url: storage.public_url(&key),
            path: key,
            size: total,
            content_type,
            uploaded_at: Utc::now(),
        });
    }
}
