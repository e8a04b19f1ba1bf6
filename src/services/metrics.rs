use metrics::counter;

/// Thin wrapper over the `metrics` facade. A no-op until a recorder is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsService;

impl MetricsService {
    pub fn new() -> Self {
        Self
    }

    pub fn record_upload(&self, bytes: u64) {
        counter!("uploads_total").increment(1);
        counter!("bytes_ingested_total").increment(bytes);
    }

    pub fn record_upload_failure(&self, reason: &'static str) {
        counter!("upload_failures_total", "reason" => reason).increment(1);
    }

    pub fn record_compensation(&self, succeeded: bool) {
        let outcome = if succeeded { "succeeded" } else { "failed" };
        counter!("compensations_total", "outcome" => outcome).increment(1);
    }

    pub fn record_sweep(&self, events_reclaimed: u64) {
        counter!("sweeps_total").increment(1);
        counter!("events_reclaimed_total").increment(events_reclaimed);
    }
}
