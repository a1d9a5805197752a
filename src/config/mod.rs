use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "s3" | "minio" => Some(StorageBackend::S3),
            "memory" => Some(StorageBackend::Memory),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::S3 => "s3",
            StorageBackend::Memory => "memory",
        }
    }
}

/// Media upload configuration
#[derive(Debug, Clone, Validate)]
pub struct MediaConfig {
    /// Storage backend: "s3" or "memory" (default: "s3")
    pub storage_backend: StorageBackend,

    /// S3 / MinIO endpoint (default: "http://127.0.0.1:9000")
    #[validate(url)]
    pub endpoint_url: String,

    pub access_key: String,
    pub secret_key: String,

    /// Bucket holding CMS media (default: "cms-media")
    #[validate(length(min = 3, max = 63))]
    pub bucket: String,

    /// Region sent to the S3 client (default: "us-east-1")
    pub region: String,

    /// Base of publicly fetchable object URLs (default: endpoint + bucket)
    #[validate(url)]
    pub public_base_url: String,

    /// Maximum size of one uploaded file in bytes (default: 256 MB)
    #[validate(range(min = 1))]
    pub max_file_size: usize,

    /// Multipart part size in bytes; S3 requires at least 5 MB (default: 8 MB)
    #[validate(range(min = 5242880))]
    pub part_size: usize,

    /// Origin used in object URLs for staged blobs (default: "http://127.0.0.1:8080")
    #[validate(url)]
    pub object_url_origin: String,

    /// Preview server address (default: 127.0.0.1:8080)
    pub bind_addr: SocketAddr,

    /// Seconds a staged object URL lives without being revoked or persisted (default: 3600)
    #[validate(range(min = 1))]
    pub lease_ttl_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::S3,
            endpoint_url: "http://127.0.0.1:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            bucket: "cms-media".to_string(),
            region: "us-east-1".to_string(),
            public_base_url: "http://127.0.0.1:9000/cms-media".to_string(),
            max_file_size: 256 * 1024 * 1024, // 256 MB
            part_size: 8 * 1024 * 1024,       // 8 MB
            object_url_origin: "http://127.0.0.1:8080".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            lease_ttl_secs: 3600,
        }
    }
}

impl MediaConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        let endpoint_url = env::var("MINIO_ENDPOINT").unwrap_or(default.endpoint_url);
        let bucket = env::var("MINIO_BUCKET").unwrap_or(default.bucket);
        let public_base_url = env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| {
            format!("{}/{}", endpoint_url.trim_end_matches('/'), bucket)
        });
        let bind_addr = env::var("PREVIEW_BIND_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default.bind_addr);

        Self {
            storage_backend: env::var("STORAGE_BACKEND")
                .ok()
                .and_then(|v| StorageBackend::parse(&v))
                .unwrap_or(default.storage_backend),

            endpoint_url,

            access_key: env::var("MINIO_ACCESS_KEY").unwrap_or(default.access_key),
            secret_key: env::var("MINIO_SECRET_KEY").unwrap_or(default.secret_key),

            bucket,

            region: env::var("S3_REGION").unwrap_or(default.region),

            public_base_url,

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            part_size: env::var("UPLOAD_PART_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.part_size),

            object_url_origin: env::var("OBJECT_URL_ORIGIN")
                .unwrap_or_else(|_| format!("http://{}", bind_addr)),

            bind_addr,

            lease_ttl_secs: env::var("OBJECT_URL_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.lease_ttl_secs),
        }
    }

    /// Create config for development (in-memory storage, no credentials)
    pub fn development() -> Self {
        Self {
            storage_backend: StorageBackend::Memory,
            public_base_url: "http://127.0.0.1:8080/media".to_string(),
            ..Self::default()
        }
    }

    /// Create config for production (S3 credentials must be set)
    pub fn production() -> Result<Self> {
        let config = Self {
            storage_backend: StorageBackend::S3,
            endpoint_url: env::var("MINIO_ENDPOINT").context("MINIO_ENDPOINT must be set")?,
            access_key: env::var("MINIO_ACCESS_KEY").context("MINIO_ACCESS_KEY must be set")?,
            secret_key: env::var("MINIO_SECRET_KEY").context("MINIO_SECRET_KEY must be set")?,
            bucket: env::var("MINIO_BUCKET").context("MINIO_BUCKET must be set")?,
            public_base_url: env::var("PUBLIC_BASE_URL").context("PUBLIC_BASE_URL must be set")?,
            ..Self::from_env()
        };
        config.validate()?;
        Ok(config)
    }
}
