use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account holding the upload and event allowances.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    /// Remaining global upload credits. May go negative under concurrent uploads.
    pub photo_allowance: i32,
    /// Remaining events this user may still create.
    pub event_allowance: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
