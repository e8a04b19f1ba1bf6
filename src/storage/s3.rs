use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::{debug, info};

use crate::{
    config::ContentStoreConfig,
    storage::{ContentStore, StorageError},
};

/// Content store on any S3-compatible bucket (AWS, R2, MinIO).
pub struct S3ContentStore {
    client: S3Client,
    bucket: String,
}

impl S3ContentStore {
    pub async fn new(bucket: &str, config: &ContentStoreConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.s3_region.clone()));

        if let (Some(access_key), Some(secret_key)) =
            (&config.s3_access_key, &config.s3_secret_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "event-photos-config",
            ));
        }

        let sdk_config = loader.load().await;
        let mut s3_config_builder = S3ConfigBuilder::from(&sdk_config);

        // R2 and MinIO need an explicit endpoint
        if let Some(ref endpoint_url) = config.s3_endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }
        if config.s3_force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %bucket,
            region = %config.s3_region,
            "S3 content store initialized"
        );

        Self {
            client,
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl ContentStore for S3ContentStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StorageError> {
        debug!(key = %key, size_bytes = data.len(), "Uploading object");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("failed to upload `{}`: {}", key, e)))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("failed to delete `{}`: {}", key, e)))?;

        Ok(())
    }
}
