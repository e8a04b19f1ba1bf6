//! Allowance counters on users and events.
//!
//! Every operation reads one record and writes the whole record back. There is
//! no row locking and no compare-and-swap, so a check and a later decrement are
//! separated by the upload's network latency. Concurrent uploads that pass the
//! check against the last unit of allowance will all commit, driving the
//! counter negative (or past the event cap) by the degree of concurrency.

use std::{fmt, sync::Arc};
use uuid::Uuid;

use crate::{
    database::{EventRepository, UserRepository},
    errors::{AppError, Result},
    models::{Actor, Event, User},
};

/// The counter a rejected upload ran out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaCounter {
    OwnerPhotoAllowance,
    ActorPhotoAllowance,
    EventPhotoCap,
}

impl fmt::Display for QuotaCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaCounter::OwnerPhotoAllowance => f.write_str("event owner photo allowance"),
            QuotaCounter::ActorPhotoAllowance => f.write_str("uploader photo allowance"),
            QuotaCounter::EventPhotoCap => f.write_str("event photo cap"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterRef {
    UserPhotos(Uuid),
    UserEvents(Uuid),
    EventPhotos(Uuid),
}

impl fmt::Display for CounterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterRef::UserPhotos(id) => write!(f, "user:{}/photo_allowance", id),
            CounterRef::UserEvents(id) => write!(f, "user:{}/event_allowance", id),
            CounterRef::EventPhotos(id) => write!(f, "event:{}/photo_count", id),
        }
    }
}

#[derive(Clone)]
pub struct QuotaLedger {
    users: Arc<dyn UserRepository>,
    events: Arc<dyn EventRepository>,
}

impl QuotaLedger {
    pub fn new(users: Arc<dyn UserRepository>, events: Arc<dyn EventRepository>) -> Self {
        Self { users, events }
    }

    /// For `EventPhotos` this is true while the event is uncapped or under its cap.
    pub async fn check_positive(&self, counter: CounterRef) -> Result<bool> {
        match counter {
            CounterRef::UserPhotos(id) => Ok(self.load_user(id).await?.photo_allowance > 0),
            CounterRef::UserEvents(id) => Ok(self.load_user(id).await?.event_allowance > 0),
            CounterRef::EventPhotos(id) => Ok(self.load_event(id).await?.has_photo_headroom()),
        }
    }

    pub async fn decrement(&self, counter: CounterRef) -> Result<()> {
        self.adjust(counter, -1).await
    }

    pub async fn increment(&self, counter: CounterRef) -> Result<()> {
        self.adjust(counter, 1).await
    }

    async fn adjust(&self, counter: CounterRef, delta: i32) -> Result<()> {
        match counter {
            CounterRef::UserPhotos(id) => {
                let mut user = self.load_user(id).await?;
                user.photo_allowance += delta;
                self.users.update(&user).await
            }
            CounterRef::UserEvents(id) => {
                let mut user = self.load_user(id).await?;
                user.event_allowance += delta;
                self.users.update(&user).await
            }
            CounterRef::EventPhotos(id) => {
                let mut event = self.load_event(id).await?;
                event.photo_count += delta;
                self.events.update(&event).await
            }
        }
    }

    /// Admission check for one upload. Nothing is decremented here.
    pub async fn precheck_upload(&self, event: &Event, actor: Actor) -> Result<()> {
        if !self.check_positive(CounterRef::UserPhotos(event.user_id)).await? {
            return Err(AppError::QuotaExceeded(QuotaCounter::OwnerPhotoAllowance));
        }

        if !event.has_photo_headroom() {
            return Err(AppError::QuotaExceeded(QuotaCounter::EventPhotoCap));
        }

        if let Some(actor_id) = uploader_other_than_owner(event, actor) {
            if !self.check_positive(CounterRef::UserPhotos(actor_id)).await? {
                return Err(AppError::QuotaExceeded(QuotaCounter::ActorPhotoAllowance));
            }
        }

        Ok(())
    }

    /// Charges a durable upload: uploader, then owner, then the event's count.
    /// Failures are logged and do not stop the remaining steps.
    pub async fn commit_upload(&self, event: &Event, actor: Actor) {
        let mut steps = Vec::with_capacity(3);
        if let Some(actor_id) = uploader_other_than_owner(event, actor) {
            steps.push((CounterRef::UserPhotos(actor_id), -1));
        }
        steps.push((CounterRef::UserPhotos(event.user_id), -1));
        steps.push((CounterRef::EventPhotos(event.id), 1));

        for (counter, delta) in steps {
            if let Err(e) = self.adjust(counter, delta).await {
                tracing::warn!(
                    counter = %counter,
                    delta,
                    error = %e,
                    "Quota commit failed after durable upload"
                );
            }
        }
    }

    async fn load_user(&self, id: Uuid) -> Result<User> {
        self.users.get_by_id(id).await?.ok_or(AppError::NotFound("user"))
    }

    async fn load_event(&self, id: Uuid) -> Result<Event> {
        self.events.get_by_id(id).await?.ok_or(AppError::NotFound("event"))
    }
}

/// The owner pays once when uploading to their own event.
fn uploader_other_than_owner(event: &Event, actor: Actor) -> Option<Uuid> {
    actor.user_id().filter(|id| *id != event.user_id)
}
