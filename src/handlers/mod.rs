use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::{database::Database, services::photo_service::PhotoService};

pub mod health;
pub mod metrics;

/// Shared with every handler. The photo request layer reaches the core
/// through `photos`.
#[derive(Clone)]
pub struct AppState {
    pub database: Arc<Database>,
    pub photos: Arc<PhotoService>,
    pub metrics: PrometheusHandle,
}
