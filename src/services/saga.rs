//! Ordered record of resources acquired during one upload, each paired with
//! the delete that reverses it.

use std::{fmt, sync::Arc};

use crate::{
    services::metrics::MetricsService,
    storage::{ContentStore, Destination, RenditionStore},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquired {
    ContentObject(String),
    Rendition(String),
}

impl Acquired {
    pub fn destination(&self) -> Destination {
        match self {
            Acquired::ContentObject(_) => Destination::ContentStore,
            Acquired::Rendition(_) => Destination::RenditionStore,
        }
    }
}

impl fmt::Display for Acquired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Acquired::ContentObject(key) => write!(f, "content object `{}`", key),
            Acquired::Rendition(id) => write!(f, "rendition `{}`", id),
        }
    }
}

pub struct Saga {
    content: Arc<dyn ContentStore>,
    renditions: Arc<dyn RenditionStore>,
    acquired: Vec<Acquired>,
    metrics: MetricsService,
}

impl Saga {
    pub fn new(content: Arc<dyn ContentStore>, renditions: Arc<dyn RenditionStore>) -> Self {
        Self {
            content,
            renditions,
            acquired: Vec::new(),
            metrics: MetricsService::new(),
        }
    }

    pub fn record(&mut self, resource: Acquired) {
        self.acquired.push(resource);
    }

    /// Undoes every recorded resource, most recent first. Failures are logged
    /// and counted; the count is returned so callers never mask their own error.
    pub async fn compensate(self) -> usize {
        let mut failures = 0;

        for resource in self.acquired.iter().rev() {
            let result = match resource {
                Acquired::ContentObject(key) => self.content.delete(key).await,
                Acquired::Rendition(id) => self.renditions.delete(id).await,
            };

            match result {
                Ok(()) => {
                    tracing::debug!(resource = %resource, "Compensated");
                    self.metrics.record_compensation(true);
                }
                Err(e) => {
                    failures += 1;
                    tracing::error!(
                        resource = %resource,
                        destination = %resource.destination(),
                        error = %e,
                        "Compensation failed, artifact left behind"
                    );
                    self.metrics.record_compensation(false);
                }
            }
        }

        failures
    }
}
