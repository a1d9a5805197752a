use crate::config::{MediaConfig, StorageBackend};
use crate::services::memory_storage::MemoryStorageService;
use crate::services::storage::{S3StorageService, StorageService};
use aws_sdk_s3::config::Region;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &MediaConfig) -> Arc<dyn StorageService> {
    match config.storage_backend {
        StorageBackend::Memory => {
            info!("🧪 In-memory storage (public URLs under {})", config.public_base_url);
            Arc::new(MemoryStorageService::new(config.public_base_url.clone()))
        }
        StorageBackend::S3 => {
            info!(
                "☁️  S3 Storage: {} (Bucket: {})",
                config.endpoint_url, config.bucket
            );

            let aws_config = aws_config::from_env()
                .endpoint_url(&config.endpoint_url)
                .region(Region::new(config.region.clone()))
                .credentials_provider(aws_sdk_s3::config::Credentials::new(
                    config.access_key.clone(),
                    config.secret_key.clone(),
                    None,
                    None,
                    "static",
                ))
                .load()
                .await;

            let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(true)
                .build();

            let s3_client = aws_sdk_s3::Client::from_conf(s3_config);
            Arc::new(S3StorageService::new(
                s3_client,
                config.bucket.clone(),
                config.public_base_url.clone(),
            ))
        }
    }
}
