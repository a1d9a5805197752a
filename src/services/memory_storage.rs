use crate::services::storage::StorageService;
use crate::utils::object_key::public_object_url;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: Option<String>,
}

struct PendingMultipart {
    key: String,
    content_type: Option<String>,
    parts: BTreeMap<i32, Bytes>,
}

/// In-process object store with the same visibility rules as S3: multipart
/// objects are invisible until completed and vanish on abort.
pub struct MemoryStorageService {
    public_base_url: String,
    objects: DashMap<String, StoredObject>,
    pending: DashMap<String, PendingMultipart>,
}

impl MemoryStorageService {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
            objects: DashMap::new(),
            pending: DashMap::new(),
        }
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    pub fn pending_uploads(&self) -> usize {
        self.pending.len()
    }

    fn etag(upload_id: &str, part_number: i32) -> String {
        format!("\"{}-{}\"", upload_id, part_number)
    }
}

#[async_trait]
impl StorageService for MemoryStorageService {
    async fn put_object(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        self.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<String> {
        let upload_id = Uuid::new_v4().to_string();
        self.pending.insert(
            upload_id.clone(),
            PendingMultipart {
                key: key.to_string(),
                content_type: content_type.map(str::to_string),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let mut upload = self
            .pending
            .get_mut(upload_id)
            .ok_or_else(|| anyhow!("Unknown upload ID: {}", upload_id))?;
        if upload.key != key {
            return Err(anyhow!("Upload {} does not belong to {}", upload_id, key));
        }
        upload.parts.insert(part_number, data);
        Ok(Self::etag(upload_id, part_number))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> Result<()> {
        let (_, upload) = self
            .pending
            .remove(upload_id)
            .ok_or_else(|| anyhow!("Unknown upload ID: {}", upload_id))?;
        if upload.key != key {
            return Err(anyhow!("Upload {} does not belong to {}", upload_id, key));
        }

        let mut data = BytesMut::new();
        for (part_number, etag) in parts {
            let part = upload
                .parts
                .get(&part_number)
                .ok_or_else(|| anyhow!("Missing part {}", part_number))?;
            if etag != Self::etag(upload_id, part_number) {
                return Err(anyhow!("ETag mismatch for part {}", part_number));
            }
            data.extend_from_slice(part);
        }

        self.objects.insert(
            key.to_string(),
            StoredObject {
                data: data.freeze(),
                content_type: upload.content_type,
            },
        );
        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> Result<()> {
        self.pending.remove(upload_id);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.objects.remove(key);
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn public_url(&self, key: &str) -> String {
        public_object_url(&self.public_base_url, key)
    }
}
