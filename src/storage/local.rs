use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};
use tokio::fs;

use crate::{
    errors::{AppError, Result},
    storage::{ContentStore, StorageError},
};

/// Content store on the local filesystem, one file per key beneath `base_path`.
pub struct LocalContentStore {
    base_path: PathBuf,
}

impl LocalContentStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        std::fs::create_dir_all(&base_path).map_err(|e| {
            AppError::Config(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(Self { base_path })
    }

    fn get_full_path(&self, key: &str) -> std::result::Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(StorageError::Backend(format!("invalid object key `{}`", key)));
        }
        Ok(self.base_path.join(relative))
    }

    pub async fn exists(&self, key: &str) -> std::result::Result<bool, StorageError> {
        let full_path = self.get_full_path(key)?;
        Ok(fs::try_exists(&full_path).await?)
    }

    pub async fn read(&self, key: &str) -> std::result::Result<Vec<u8>, StorageError> {
        let full_path = self.get_full_path(key)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        _content_type: &str,
    ) -> std::result::Result<(), StorageError> {
        let full_path = self.get_full_path(key)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write beside the target and rename so readers never see a torn file.
        let staging = full_path.with_extension("partial");
        fs::write(&staging, &data).await?;
        fs::rename(&staging, &full_path).await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> std::result::Result<(), StorageError> {
        let full_path = self.get_full_path(key)?;

        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
