use futures::{future::BoxFuture, stream, FutureExt, StreamExt};
use std::{fmt, sync::Arc};
use tracing::{error, info, warn};

use crate::{
    database::{EventRepository, PhotoRepository, UserRepository},
    errors::AppError,
    models::Event,
    services::{
        dual_writer::DualDestinationWriter,
        photo_service::artifacts_of,
        quota_ledger::{CounterRef, QuotaLedger},
    },
};

/// Concurrent artifact removals per event.
const REMOVAL_CONCURRENCY: usize = 8;

/// Step of tearing down one event, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimStage {
    LoadPhotos,
    DeleteArtifacts,
    DeleteRecords,
    DeleteEvent,
    RestoreOwnerEventAllowance,
}

impl fmt::Display for ReclaimStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            ReclaimStage::LoadPhotos => "load_photos",
            ReclaimStage::DeleteArtifacts => "delete_artifacts",
            ReclaimStage::DeleteRecords => "delete_records",
            ReclaimStage::DeleteEvent => "delete_event",
            ReclaimStage::RestoreOwnerEventAllowance => "restore_owner_event_allowance",
        };
        f.write_str(stage)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimOutcome {
    pub photos_removed: u64,
    pub artifact_failures: u64,
}

/// Removes an event together with its photos and their artifacts, then hands
/// the owner one event allowance back. Shared by manual event deletion and the
/// expiry sweeper.
pub struct EventReclaimer {
    events: Arc<dyn EventRepository>,
    photos: Arc<dyn PhotoRepository>,
    ledger: QuotaLedger,
    writer: DualDestinationWriter,
}

impl EventReclaimer {
    pub fn new(
        events: Arc<dyn EventRepository>,
        users: Arc<dyn UserRepository>,
        photos: Arc<dyn PhotoRepository>,
        writer: DualDestinationWriter,
    ) -> Self {
        Self {
            ledger: QuotaLedger::new(users, events.clone()),
            events,
            photos,
            writer,
        }
    }

    /// Artifact removal is best-effort and only counted. Failing to delete the
    /// photo records or the event stops the teardown at that stage.
    pub async fn reclaim(
        &self,
        event: &Event,
    ) -> std::result::Result<ReclaimOutcome, (ReclaimStage, AppError)> {
        let photos = self
            .photos
            .get_by_event_id(event.id)
            .await
            .map_err(|e| (ReclaimStage::LoadPhotos, e))?;

        let removals: Vec<BoxFuture<'_, usize>> = photos
            .iter()
            .map(|photo| {
                async move {
                    let removal = self.writer.remove(&artifacts_of(photo)).await;
                    if !removal.is_clean() {
                        warn!(
                            photo_id = %photo.id,
                            stage = %ReclaimStage::DeleteArtifacts,
                            content_error = ?removal.content,
                            rendition_error = ?removal.rendition,
                            "Artifact removal failed"
                        );
                    }
                    removal.failures()
                }
                .boxed()
            })
            .collect();
        let artifact_failures: usize = stream::iter(removals)
            .buffer_unordered(REMOVAL_CONCURRENCY)
            .fold(0, |total, failures| async move { total + failures })
            .await;

        let photos_removed = self
            .photos
            .delete_by_event_id(event.id)
            .await
            .map_err(|e| (ReclaimStage::DeleteRecords, e))?;

        self.events
            .delete(event.id)
            .await
            .map_err(|e| (ReclaimStage::DeleteEvent, e))?;

        // The event is already gone; a lost allowance is logged, not retried.
        if let Err(e) = self
            .ledger
            .increment(CounterRef::UserEvents(event.user_id))
            .await
        {
            error!(
                event_id = %event.id,
                user_id = %event.user_id,
                stage = %ReclaimStage::RestoreOwnerEventAllowance,
                error = %e,
                "Failed to restore owner event allowance"
            );
        }

        info!(event_id = %event.id, photos = photos_removed, "Event reclaimed");
        Ok(ReclaimOutcome {
            photos_removed,
            artifact_failures: artifact_failures as u64,
        })
    }
}
