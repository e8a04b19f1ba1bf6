use async_trait::async_trait;
use bytes::Bytes;
use std::{fmt, sync::Arc};
use thiserror::Error;

use crate::config::{ContentBackend, ContentStoreConfig};
use crate::errors::{AppError, Result};

pub mod local;
pub mod memory;
pub mod rendition;
pub mod s3;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{0}` not found")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rendition service rejected the request: {0}")]
    Rejected(String),

    #[error("{0}")]
    Backend(String),
}

/// The two independent places an upload lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    ContentStore,
    RenditionStore,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::ContentStore => f.write_str("content store"),
            Destination::RenditionStore => f.write_str("rendition store"),
        }
    }
}

/// Named renditions the image service derives from one stored image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Public,
    Thumbnail,
    Medium,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Public => "public",
            Variant::Thumbnail => "thumbnail",
            Variant::Medium => "medium",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable blob storage for the original bytes.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> std::result::Result<(), StorageError>;

    /// Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> std::result::Result<(), StorageError>;
}

/// Image service that stores one image and serves derived variants of it.
#[async_trait]
pub trait RenditionStore: Send + Sync {
    async fn upload(
        &self,
        data: Bytes,
        file_name: &str,
    ) -> std::result::Result<String, StorageError>;

    /// Deleting a missing image succeeds.
    async fn delete(&self, image_id: &str) -> std::result::Result<(), StorageError>;

    /// Pure URL composition, no network access.
    fn derived_url(&self, image_id: &str, variant: Variant) -> String;
}

pub async fn create_content_store(config: &ContentStoreConfig) -> Result<Arc<dyn ContentStore>> {
    match config.backend {
        ContentBackend::Local => {
            let storage = local::LocalContentStore::new(&config.local_path)?;
            Ok(Arc::new(storage))
        }
        ContentBackend::S3 => {
            let bucket = config.s3_bucket.as_deref().ok_or_else(|| {
                AppError::Config(
                    "content_store.s3_bucket is required for the s3 backend".to_string(),
                )
            })?;
            let storage = s3::S3ContentStore::new(bucket, config).await;
            Ok(Arc::new(storage))
        }
    }
}
