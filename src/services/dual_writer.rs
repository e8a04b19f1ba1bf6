use anyhow::anyhow;
use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use tokio::{sync::oneshot, task::JoinHandle};
use uuid::Uuid;

use crate::{
    errors::{AppError, Result},
    services::saga::{Acquired, Saga},
    storage::{ContentStore, Destination, RenditionStore, StorageError, Variant},
    utils::{Clock, KeyGenerator},
};

/// What the writer needs to know about the payload besides its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMeta {
    pub event_id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub extension: String,
}

/// Identifiers of one payload stored in both destinations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifacts {
    pub content_key: String,
    pub rendition_id: String,
}

/// Per-destination outcome of removing a pair of artifacts.
#[derive(Debug, Default)]
pub struct RemovalReport {
    pub content: Option<StorageError>,
    pub rendition: Option<StorageError>,
}

impl RemovalReport {
    pub fn is_clean(&self) -> bool {
        self.content.is_none() && self.rendition.is_none()
    }

    pub fn failures(&self) -> usize {
        usize::from(self.content.is_some()) + usize::from(self.rendition.is_some())
    }

    /// The content-store failure wins when both destinations failed.
    pub fn into_result(self) -> Result<()> {
        match (self.content, self.rendition) {
            (Some(e), _) | (None, Some(e)) => Err(AppError::Storage(e)),
            (None, None) => Ok(()),
        }
    }
}

/// Writes one payload to the content store and the rendition store at once.
///
/// Both writes run as their own tasks and are joined by a coordinator task.
/// The caller waits on the coordinator with a single timeout. If the caller
/// stops waiting, whatever eventually lands is deleted by the coordinator, so
/// an abandoned write does not leave artifacts behind.
#[derive(Clone)]
pub struct DualDestinationWriter {
    content: Arc<dyn ContentStore>,
    renditions: Arc<dyn RenditionStore>,
    clock: Arc<dyn Clock>,
    keys: Arc<KeyGenerator>,
    timeout: Duration,
}

impl DualDestinationWriter {
    pub fn new(
        content: Arc<dyn ContentStore>,
        renditions: Arc<dyn RenditionStore>,
        clock: Arc<dyn Clock>,
        keys: Arc<KeyGenerator>,
        timeout: Duration,
    ) -> Self {
        Self {
            content,
            renditions,
            clock,
            keys,
            timeout,
        }
    }

    pub async fn write(&self, data: Bytes, meta: &ArtifactMeta) -> Result<StoredArtifacts> {
        let content_key = self
            .keys
            .content_key(meta.event_id, self.clock.now(), &meta.extension);

        let content_task: JoinHandle<std::result::Result<String, StorageError>> = {
            let store = self.content.clone();
            let data = data.clone();
            let key = content_key.clone();
            let mime_type = meta.mime_type.clone();
            tokio::spawn(async move {
                store.put(&key, data, &mime_type).await?;
                Ok(key)
            })
        };

        let rendition_task: JoinHandle<std::result::Result<String, StorageError>> = {
            let store = self.renditions.clone();
            let file_name = meta.file_name.clone();
            tokio::spawn(async move { store.upload(data, &file_name).await })
        };

        let (tx, mut rx) = oneshot::channel::<Result<StoredArtifacts>>();
        let coordinator = self.clone();
        tokio::spawn(async move {
            let (content, rendition) = tokio::join!(content_task, rendition_task);
            let outcome = coordinator
                .settle(flatten(content), flatten(rendition))
                .await;

            if let Err(Ok(abandoned)) = tx.send(outcome) {
                tracing::warn!(
                    content_key = %abandoned.content_key,
                    rendition_id = %abandoned.rendition_id,
                    "Reaping artifacts of an abandoned upload"
                );
                coordinator.compensate(&abandoned).await;
            }
        });

        match tokio::time::timeout(self.timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(AppError::Internal(anyhow!(
                "dual write coordinator exited without a result"
            ))),
            Err(_) => {
                rx.close();
                // A result that raced the deadline is ours to clean up.
                if let Ok(Ok(late)) = rx.try_recv() {
                    let writer = self.clone();
                    tokio::spawn(async move { writer.compensate(&late).await });
                }
                tracing::warn!(
                    event_id = %meta.event_id,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Dual write timed out"
                );
                Err(AppError::UploadTimeout(self.timeout))
            }
        }
    }

    async fn settle(
        &self,
        content: std::result::Result<String, StorageError>,
        rendition: std::result::Result<String, StorageError>,
    ) -> Result<StoredArtifacts> {
        match (content, rendition) {
            (Ok(content_key), Ok(rendition_id)) => Ok(StoredArtifacts {
                content_key,
                rendition_id,
            }),
            (Ok(content_key), Err(e)) => {
                let mut saga = self.saga();
                saga.record(Acquired::ContentObject(content_key));
                saga.compensate().await;
                Err(AppError::PartialUpload {
                    failed: Destination::RenditionStore,
                    source: e,
                })
            }
            (Err(e), Ok(rendition_id)) => {
                let mut saga = self.saga();
                saga.record(Acquired::Rendition(rendition_id));
                saga.compensate().await;
                Err(AppError::PartialUpload {
                    failed: Destination::ContentStore,
                    source: e,
                })
            }
            (Err(content_err), Err(rendition_err)) => {
                tracing::warn!(error = %rendition_err, "Rendition store write also failed");
                Err(AppError::Storage(content_err))
            }
        }
    }

    fn saga(&self) -> Saga {
        Saga::new(self.content.clone(), self.renditions.clone())
    }

    /// Best-effort undo of a completed write. Returns the number of deletes that failed.
    pub async fn compensate(&self, artifacts: &StoredArtifacts) -> usize {
        let mut saga = self.saga();
        saga.record(Acquired::ContentObject(artifacts.content_key.clone()));
        saga.record(Acquired::Rendition(artifacts.rendition_id.clone()));
        saga.compensate().await
    }

    /// Deletes both artifacts concurrently and reports each outcome.
    pub async fn remove(&self, artifacts: &StoredArtifacts) -> RemovalReport {
        let (content, rendition) = tokio::join!(
            self.content.delete(&artifacts.content_key),
            self.renditions.delete(&artifacts.rendition_id)
        );

        RemovalReport {
            content: content.err(),
            rendition: rendition.err(),
        }
    }

    pub fn derived_url(&self, rendition_id: &str, variant: Variant) -> String {
        self.renditions.derived_url(rendition_id, variant)
    }
}

fn flatten(
    joined: std::result::Result<std::result::Result<String, StorageError>, tokio::task::JoinError>,
) -> std::result::Result<String, StorageError> {
    joined.unwrap_or_else(|e| Err(StorageError::Backend(format!("write task failed: {}", e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{MemoryContentStore, MemoryRenditionStore};
    use crate::utils::SystemClock;

    struct Fixture {
        content: Arc<MemoryContentStore>,
        renditions: Arc<MemoryRenditionStore>,
        writer: DualDestinationWriter,
    }

    fn fixture(timeout: Duration) -> Fixture {
        let content = Arc::new(MemoryContentStore::new());
        let renditions = Arc::new(MemoryRenditionStore::default());
        let writer = DualDestinationWriter::new(
            content.clone(),
            renditions.clone(),
            Arc::new(SystemClock),
            Arc::new(KeyGenerator::seeded(1)),
            timeout,
        );
        Fixture {
            content,
            renditions,
            writer,
        }
    }

    fn meta() -> ArtifactMeta {
        ArtifactMeta {
            event_id: Uuid::new_v4(),
            file_name: "cake.png".to_string(),
            mime_type: "image/png".to_string(),
            extension: "png".to_string(),
        }
    }

    fn payload() -> Bytes {
        Bytes::from_static(b"\x89PNG\r\n\x1a\n fake")
    }

    #[tokio::test]
    async fn test_both_destinations_receive_the_payload() {
        let f = fixture(Duration::from_secs(5));
        let meta = meta();

        let stored = f.writer.write(payload(), &meta).await.unwrap();

        assert!(stored
            .content_key
            .starts_with(&format!("events/{}/", meta.event_id)));
        assert!(stored.content_key.ends_with(".png"));
        assert_eq!(f.content.get(&stored.content_key), Some(payload()));
        assert!(f.renditions.contains(&stored.rendition_id));
    }

    #[tokio::test]
    async fn test_rendition_failure_compensates_content_write() {
        let f = fixture(Duration::from_secs(5));
        f.renditions.fail_uploads(true);

        let err = f.writer.write(payload(), &meta()).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::PartialUpload {
                failed: Destination::RenditionStore,
                ..
            }
        ));
        assert!(f.content.is_empty());
        assert_eq!(f.content.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_content_failure_compensates_rendition_upload() {
        let f = fixture(Duration::from_secs(5));
        f.content.fail_writes(true);

        let err = f.writer.write(payload(), &meta()).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::PartialUpload {
                failed: Destination::ContentStore,
                ..
            }
        ));
        assert!(f.renditions.is_empty());
        assert_eq!(f.renditions.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_double_failure_returns_content_error_without_compensation() {
        let f = fixture(Duration::from_secs(5));
        f.content.fail_writes(true);
        f.renditions.fail_uploads(true);

        let err = f.writer.write(payload(), &meta()).await.unwrap_err();

        match err {
            AppError::Storage(StorageError::Backend(msg)) => assert!(msg.contains("put")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(f.content.delete_calls(), 0);
        assert_eq!(f.renditions.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_write_is_reaped_once_it_lands() {
        let f = fixture(Duration::from_millis(50));
        f.renditions.delay_uploads(Duration::from_millis(200));

        let err = f.writer.write(payload(), &meta()).await.unwrap_err();
        assert!(matches!(err, AppError::UploadTimeout(_)));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(f.content.is_empty());
        assert!(f.renditions.is_empty());
        assert_eq!(f.content.delete_calls(), 1);
        assert_eq!(f.renditions.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_remove_reports_each_destination() {
        let f = fixture(Duration::from_secs(5));
        let stored = f.writer.write(payload(), &meta()).await.unwrap();
        f.renditions.fail_deletes(true);

        let report = f.writer.remove(&stored).await;

        assert!(report.content.is_none());
        assert!(report.rendition.is_some());
        assert_eq!(report.failures(), 1);
        assert!(!f.content.contains(&stored.content_key));
        assert!(matches!(
            report.into_result(),
            Err(AppError::Storage(StorageError::Rejected(_)))
        ));
    }
}
