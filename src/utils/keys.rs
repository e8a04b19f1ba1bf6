use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Mutex;
use uuid::Uuid;

/// Builds content-store keys from the upload time plus a random suffix.
///
/// Owns its RNG so callers control seeding; there is no process-wide generator.
#[derive(Debug)]
pub struct KeyGenerator {
    rng: Mutex<StdRng>,
}

impl KeyGenerator {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// `events/{event_id}/{unix_nanos}-{16 hex}.{extension}`
    pub fn content_key(&self, event_id: Uuid, now: DateTime<Utc>, extension: &str) -> String {
        let suffix: u64 = self.rng.lock().unwrap_or_else(|p| p.into_inner()).gen();
        let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros() * 1_000);
        format!("events/{}/{}-{:016x}.{}", event_id, nanos, suffix, extension)
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}
