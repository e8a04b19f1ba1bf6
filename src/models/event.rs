use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    /// Public slug used by gallery links.
    pub url: String,
    pub is_public: bool,
    pub allow_guest_uploads: bool,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// Per-event photo cap. `None` or `0` means uncapped.
    pub photo_limit: Option<i32>,
    pub photo_count: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|hash| !hash.is_empty())
    }

    /// The active photo cap, ignoring a stored zero.
    pub fn photo_cap(&self) -> Option<i32> {
        self.photo_limit.filter(|limit| *limit > 0)
    }

    pub fn has_photo_headroom(&self) -> bool {
        match self.photo_cap() {
            Some(cap) => self.photo_count < cap,
            None => true,
        }
    }
}

/// How a caller addressed an event. `Url` lookups come from the public gallery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRef {
    Id(Uuid),
    Url(String),
}

impl EventRef {
    pub fn is_public_gallery(&self) -> bool {
        matches!(self, EventRef::Url(_))
    }
}

impl fmt::Display for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventRef::Id(id) => write!(f, "{}", id),
            EventRef::Url(url) => write!(f, "/{}", url),
        }
    }
}

impl From<Uuid> for EventRef {
    fn from(id: Uuid) -> Self {
        EventRef::Id(id)
    }
}
