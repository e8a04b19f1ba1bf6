use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::{Database, EventRepository, PhotoRepository, UserRepository};
use crate::errors::Result;
use crate::models::{Event, NewPhoto, Photo, User};

const EVENT_COLUMNS: &str = "id, user_id, title, url, is_public, allow_guest_uploads, \
     password_hash, photo_limit, photo_count, expires_at, created_at, updated_at";

const PHOTO_COLUMNS: &str = "id, event_id, user_id, file_name, file_size, mime_type, content_key, \
     rendition_id, sha256, is_guest, created_at";

#[async_trait]
impl EventRepository for Database {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events WHERE id = $1",
            EVENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(event)
    }

    async fn get_by_url(&self, url: &str) -> Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events WHERE url = $1",
            EVENT_COLUMNS
        ))
        .bind(url)
        .fetch_optional(self.pool())
        .await?;

        Ok(event)
    }

    async fn update(&self, event: &Event) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE events
            SET title = $2, url = $3, is_public = $4, allow_guest_uploads = $5,
                password_hash = $6, photo_limit = $7, photo_count = $8,
                expires_at = $9, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.url)
        .bind(event.is_public)
        .bind(event.allow_guest_uploads)
        .bind(&event.password_hash)
        .bind(event.photo_limit)
        .bind(event.photo_count)
        .bind(event.expires_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    async fn find_expired(&self, before: DateTime<Utc>) -> Result<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events WHERE expires_at < $1 ORDER BY expires_at",
            EVENT_COLUMNS
        ))
        .bind(before)
        .fetch_all(self.pool())
        .await?;

        Ok(events)
    }
}

#[async_trait]
impl UserRepository for Database {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, full_name, email, photo_allowance, event_allowance, created_at, updated_at \
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET full_name = $2, email = $3, photo_allowance = $4,
                event_allowance = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(user.photo_allowance)
        .bind(user.event_allowance)
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl PhotoRepository for Database {
    async fn create(&self, photo: &NewPhoto) -> Result<Photo> {
        let photo = sqlx::query_as::<_, Photo>(&format!(
            r#"
            INSERT INTO photos (event_id, user_id, file_name, file_size, mime_type,
                                content_key, rendition_id, sha256, is_guest, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            PHOTO_COLUMNS
        ))
        .bind(photo.event_id)
        .bind(photo.user_id)
        .bind(&photo.file_name)
        .bind(photo.file_size)
        .bind(&photo.mime_type)
        .bind(&photo.content_key)
        .bind(&photo.rendition_id)
        .bind(&photo.sha256)
        .bind(photo.is_guest)
        .bind(photo.created_at)
        .fetch_one(self.pool())
        .await?;

        Ok(photo)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Photo>> {
        let photo = sqlx::query_as::<_, Photo>(&format!(
            "SELECT {} FROM photos WHERE id = $1",
            PHOTO_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(photo)
    }

    async fn get_by_event_id(&self, event_id: Uuid) -> Result<Vec<Photo>> {
        let photos = sqlx::query_as::<_, Photo>(&format!(
            "SELECT {} FROM photos WHERE event_id = $1 ORDER BY created_at DESC",
            PHOTO_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(self.pool())
        .await?;

        Ok(photos)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM photos WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    async fn delete_by_event_id(&self, event_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM photos WHERE event_id = $1")
            .bind(event_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }

    async fn count_by_event_id(&self, event_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM photos WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(self.pool())
            .await?;

        Ok(count)
    }
}
