use crate::config::MediaConfig;
use crate::services::file_field::{FileField, FileListField};
use crate::services::object_urls::ObjectUrlCache;
use crate::services::preview::PreviewCoordinator;
use crate::services::storage::StorageService;
use crate::services::upload_coordinator::{UnloadGuard, UploadCoordinator};
use crate::services::upload_transport::UploadTransport;
use std::sync::Arc;

/// The upload stack for one host application, wired together.
///
/// There are no process globals: each instance has its own URL registry,
/// coordinator and preview state.
#[derive(Clone)]
pub struct MediaContext {
    pub urls: ObjectUrlCache,
    pub coordinator: UploadCoordinator,
    pub previews: PreviewCoordinator,
    pub transport: Arc<UploadTransport>,
}

impl MediaContext {
    pub fn new(storage: Arc<dyn StorageService>, config: &MediaConfig) -> Self {
        Self::assemble(storage, config, UploadCoordinator::new())
    }

    pub fn with_unload_guard(
        storage: Arc<dyn StorageService>,
        config: &MediaConfig,
        guard: Arc<dyn UnloadGuard>,
    ) -> Self {
        Self::assemble(storage, config, UploadCoordinator::with_unload_guard(guard))
    }

    fn assemble(
        storage: Arc<dyn StorageService>,
        config: &MediaConfig,
        coordinator: UploadCoordinator,
    ) -> Self {
        let urls = ObjectUrlCache::new(config.object_url_origin.clone());
        let transport = UploadTransport::new(storage, coordinator.clone())
            .with_part_size(config.part_size)
            .with_max_file_size(config.max_file_size);

        Self {
            previews: PreviewCoordinator::new(urls.clone()),
            urls,
            coordinator,
            transport: Arc::new(transport),
        }
    }

    pub fn file_field(&self, name: impl Into<String>) -> FileField {
        FileField::new(name, self.urls.clone())
    }

    pub fn file_list(&self, name: impl Into<String>) -> FileListField {
        FileListField::new(name, self.urls.clone())
    }
}
