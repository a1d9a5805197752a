#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use cms_media_uploads::services::memory_storage::MemoryStorageService;
use cms_media_uploads::services::storage::StorageService;
use cms_media_uploads::services::upload_coordinator::UploadCoordinator;
use std::sync::{Arc, Mutex};

/// Memory storage with scripted failures, an operation log and an optional
/// coordinator sampled on every call.
pub struct FlakyStorage {
    pub inner: MemoryStorageService,
    ops: Mutex<Vec<String>>,
    fail_names: Mutex<Vec<String>>,
    fail_deletes: Mutex<bool>,
    fail_part: Mutex<Option<i32>>,
    slow_writes: Mutex<bool>,
    sampler: Mutex<Option<UploadCoordinator>>,
    samples: Mutex<Vec<f64>>,
}

impl FlakyStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStorageService::new("http://cdn.test/cms"),
            ops: Mutex::new(Vec::new()),
            fail_names: Mutex::new(Vec::new()),
            fail_deletes: Mutex::new(false),
            fail_part: Mutex::new(None),
            slow_writes: Mutex::new(false),
            sampler: Mutex::new(None),
            samples: Mutex::new(Vec::new()),
        })
    }

    /// Writes to keys ending in `_<name>` fail.
    pub fn fail_uploads_of(&self, name: &str) {
        self.fail_names.lock().unwrap().push(format!("_{}", name));
    }

    pub fn fail_deletes(&self) {
        *self.fail_deletes.lock().unwrap() = true;
    }

    pub fn fail_part(&self, part_number: i32) {
        *self.fail_part.lock().unwrap() = Some(part_number);
    }

    /// Every put and part yields to the scheduler once before it is stored.
    pub fn slow_writes(&self) {
        *self.slow_writes.lock().unwrap() = true;
    }

    pub fn sample_progress(&self, coordinator: UploadCoordinator) {
        *self.sampler.lock().unwrap() = Some(coordinator);
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn samples(&self) -> Vec<f64> {
        self.samples.lock().unwrap().clone()
    }

    fn record(&self, op: String) {
        if let Some(coordinator) = self.sampler.lock().unwrap().as_ref() {
            self.samples.lock().unwrap().push(coordinator.snapshot().progress);
        }
        self.ops.lock().unwrap().push(op);
    }

    fn should_fail(&self, key: &str) -> bool {
        self.fail_names
            .lock()
            .unwrap()
            .iter()
            .any(|suffix| key.ends_with(suffix.as_str()))
    }
}

#[async_trait]
impl StorageService for FlakyStorage {
    async fn put_object(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        let slow = *self.slow_writes.lock().unwrap();
        if slow {
            tokio::task::yield_now().await;
        }
        self.record(format!("put {}", key));
        if self.should_fail(key) {
            return Err(anyhow!("simulated network error for {}", key));
        }
        self.inner.put_object(key, data, content_type).await
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<String> {
        self.record(format!("create {}", key));
        self.inner.create_multipart_upload(key, content_type).await
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let slow = *self.slow_writes.lock().unwrap();
        if slow {
            tokio::task::yield_now().await;
        }
        self.record(format!("part {} {}", key, part_number));
        if *self.fail_part.lock().unwrap() == Some(part_number) {
            return Err(anyhow!("simulated part failure"));
        }
        self.inner.upload_part(key, upload_id, part_number, data).await
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> Result<()> {
        self.record(format!("complete {}", key));
        self.inner.complete_multipart_upload(key, upload_id, parts).await
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        self.record(format!("abort {}", key));
        self.inner.abort_multipart_upload(key, upload_id).await
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.record(format!("delete {}", key));
        if *self.fail_deletes.lock().unwrap() {
            return Err(anyhow!("simulated delete failure for {}", key));
        }
        self.inner.delete_object(key).await
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list_objects(prefix).await
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }
}

pub fn png(size: usize) -> Vec<u8> {
    let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    data.resize(size.max(8), 0);
    data
}
