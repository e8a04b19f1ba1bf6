use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A stored photo. Only exists once both artifacts and the row are durable.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Photo {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    /// Key of the original bytes in the content store.
    pub content_key: String,
    /// Opaque id assigned by the rendition store.
    pub rendition_id: String,
    pub sha256: String,
    pub is_guest: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPhoto {
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub content_key: String,
    pub rendition_id: String,
    pub sha256: String,
    pub is_guest: bool,
    pub created_at: DateTime<Utc>,
}

impl NewPhoto {
    pub fn into_photo(self, id: Uuid) -> Photo {
        Photo {
            id,
            event_id: self.event_id,
            user_id: self.user_id,
            file_name: self.file_name,
            file_size: self.file_size,
            mime_type: self.mime_type,
            content_key: self.content_key,
            rendition_id: self.rendition_id,
            sha256: self.sha256,
            is_guest: self.is_guest,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoUrls {
    pub public: String,
    pub thumbnail: String,
    pub medium: String,
}
