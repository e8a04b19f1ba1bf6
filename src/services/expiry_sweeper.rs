use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::{
    database::{EventRepository, PhotoRepository, UserRepository},
    errors::Result,
    services::{
        dual_writer::DualDestinationWriter, event_reclaimer::EventReclaimer,
        metrics::MetricsService,
    },
    utils::Clock,
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub events_reclaimed: u64,
    pub photos_removed: u64,
    pub artifact_failures: u64,
    pub events_failed: u64,
}

/// Reclaims events past their expiry along with their photos and artifacts.
///
/// The owner gets one event allowance back per reclaimed event. Photo
/// allowance spent on the event's uploads is not refunded.
pub struct ExpirySweeper {
    events: Arc<dyn EventRepository>,
    reclaimer: EventReclaimer,
    clock: Arc<dyn Clock>,
    metrics: MetricsService,
}

impl ExpirySweeper {
    pub fn new(
        events: Arc<dyn EventRepository>,
        users: Arc<dyn UserRepository>,
        photos: Arc<dyn PhotoRepository>,
        writer: DualDestinationWriter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reclaimer: EventReclaimer::new(events.clone(), users, photos, writer),
            events,
            clock,
            metrics: MetricsService::new(),
        }
    }

    /// One pass over every expired event. Only the initial scan can fail the
    /// whole pass; a failing event is logged and skipped.
    #[instrument(skip_all)]
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let expired = self.events.find_expired(now).await.map_err(|e| {
            error!(error = %e, "Expiry scan failed");
            e
        })?;

        let mut report = SweepReport::default();
        if expired.is_empty() {
            self.metrics.record_sweep(0);
            return Ok(report);
        }

        info!(count = expired.len(), "Found expired events");

        for event in &expired {
            match self.reclaimer.reclaim(event).await {
                Ok(outcome) => {
                    report.events_reclaimed += 1;
                    report.photos_removed += outcome.photos_removed;
                    report.artifact_failures += outcome.artifact_failures;
                }
                Err((stage, e)) => {
                    report.events_failed += 1;
                    error!(
                        event_id = %event.id,
                        stage = %stage,
                        error = %e,
                        "Failed to reclaim expired event"
                    );
                }
            }
        }

        self.metrics.record_sweep(report.events_reclaimed);
        info!(
            events_reclaimed = report.events_reclaimed,
            photos_removed = report.photos_removed,
            artifact_failures = report.artifact_failures,
            events_failed = report.events_failed,
            "Expiry sweep finished"
        );

        Ok(report)
    }

    /// Sweeps immediately, then once per `period` until `shutdown` fires.
    pub fn spawn(
        self: Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = period.as_secs(), "Starting expiry sweeper");

            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Expiry sweeper stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.run_sweep().await {
                            error!(error = %e, "Expiry sweep failed");
                        }
                    }
                }
            }
        })
    }
}
