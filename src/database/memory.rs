//! Repository implementations held in process memory. Used by the integration
//! tests and for running the server without Postgres.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};
use uuid::Uuid;

use crate::database::{EventRepository, PhotoRepository, UserRepository};
use crate::errors::{AppError, Result};
use crate::models::{Event, NewPhoto, Photo, User};

#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    photo_create: bool,
    photo_bulk_delete: bool,
    user_updates: bool,
    event_updates: bool,
    event_deletes: bool,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, User>,
    events: HashMap<Uuid, Event>,
    /// Insertion order breaks ties between photos with equal timestamps.
    photos: Vec<Photo>,
    faults: Faults,
}

fn injected(operation: &str) -> AppError {
    AppError::Internal(anyhow!("injected {} failure", operation))
}

#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_user(&self, user: User) {
        self.lock().users.insert(user.id, user);
    }

    pub fn insert_event(&self, event: Event) {
        self.lock().events.insert(event.id, event);
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.lock().users.get(&id).cloned()
    }

    pub fn event(&self, id: Uuid) -> Option<Event> {
        self.lock().events.get(&id).cloned()
    }

    pub fn photos(&self) -> Vec<Photo> {
        self.lock().photos.clone()
    }

    pub fn fail_photo_create(&self, fail: bool) {
        self.lock().faults.photo_create = fail;
    }

    pub fn fail_photo_bulk_delete(&self, fail: bool) {
        self.lock().faults.photo_bulk_delete = fail;
    }

    pub fn fail_user_updates(&self, fail: bool) {
        self.lock().faults.user_updates = fail;
    }

    pub fn fail_event_updates(&self, fail: bool) {
        self.lock().faults.event_updates = fail;
    }

    pub fn fail_event_deletes(&self, fail: bool) {
        self.lock().faults.event_deletes = fail;
    }
}

#[async_trait]
impl EventRepository for MemoryDatabase {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Event>> {
        Ok(self.event(id))
    }

    async fn get_by_url(&self, url: &str) -> Result<Option<Event>> {
        Ok(self.lock().events.values().find(|e| e.url == url).cloned())
    }

    async fn update(&self, event: &Event) -> Result<()> {
        let mut state = self.lock();
        if state.faults.event_updates {
            return Err(injected("event update"));
        }
        if let Some(existing) = state.events.get_mut(&event.id) {
            *existing = Event {
                updated_at: Utc::now(),
                ..event.clone()
            };
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut state = self.lock();
        if state.faults.event_deletes {
            return Err(injected("event delete"));
        }
        state.events.remove(&id);
        Ok(())
    }

    async fn find_expired(&self, before: DateTime<Utc>) -> Result<Vec<Event>> {
        let mut expired: Vec<Event> = self
            .lock()
            .events
            .values()
            .filter(|e| e.expires_at < before)
            .cloned()
            .collect();
        expired.sort_by_key(|e| e.expires_at);
        Ok(expired)
    }
}

#[async_trait]
impl UserRepository for MemoryDatabase {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.user(id))
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut state = self.lock();
        if state.faults.user_updates {
            return Err(injected("user update"));
        }
        if let Some(existing) = state.users.get_mut(&user.id) {
            *existing = User {
                updated_at: Utc::now(),
                ..user.clone()
            };
        }
        Ok(())
    }
}

#[async_trait]
impl PhotoRepository for MemoryDatabase {
    async fn create(&self, photo: &NewPhoto) -> Result<Photo> {
        let mut state = self.lock();
        if state.faults.photo_create {
            return Err(injected("photo insert"));
        }
        let photo = photo.clone().into_photo(Uuid::new_v4());
        state.photos.push(photo.clone());
        Ok(photo)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Photo>> {
        Ok(self.lock().photos.iter().find(|p| p.id == id).cloned())
    }

    async fn get_by_event_id(&self, event_id: Uuid) -> Result<Vec<Photo>> {
        let mut photos: Vec<Photo> = self
            .lock()
            .photos
            .iter()
            .rev()
            .filter(|p| p.event_id == event_id)
            .cloned()
            .collect();
        photos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(photos)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.lock().photos.retain(|p| p.id != id);
        Ok(())
    }

    async fn delete_by_event_id(&self, event_id: Uuid) -> Result<u64> {
        let mut state = self.lock();
        if state.faults.photo_bulk_delete {
            return Err(injected("photo bulk delete"));
        }
        let before = state.photos.len();
        state.photos.retain(|p| p.event_id != event_id);
        Ok((before - state.photos.len()) as u64)
    }

    async fn count_by_event_id(&self, event_id: Uuid) -> Result<i64> {
        let count = self
            .lock()
            .photos
            .iter()
            .filter(|p| p.event_id == event_id)
            .count();
        Ok(count as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_photo(event_id: Uuid, created_at: DateTime<Utc>) -> NewPhoto {
        NewPhoto {
            event_id,
            user_id: None,
            file_name: "a.jpg".to_string(),
            file_size: 3,
            mime_type: "image/jpeg".to_string(),
            content_key: format!("events/{}/k.jpg", event_id),
            rendition_id: "r".to_string(),
            sha256: "00".to_string(),
            is_guest: true,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_photos_listed_newest_first() {
        let db = MemoryDatabase::new();
        let event_id = Uuid::new_v4();
        let t0 = Utc::now();

        let old = db.create(&new_photo(event_id, t0)).await.unwrap();
        let new = db.create(&new_photo(event_id, t0 + Duration::seconds(5))).await.unwrap();
        let tied = db.create(&new_photo(event_id, t0 + Duration::seconds(5))).await.unwrap();
        db.create(&new_photo(Uuid::new_v4(), t0)).await.unwrap();

        let listed: Vec<Uuid> = db
            .get_by_event_id(event_id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();

        assert_eq!(listed, vec![tied.id, new.id, old.id]);
        assert_eq!(db.count_by_event_id(event_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_bulk_delete_reports_rows() {
        let db = MemoryDatabase::new();
        let event_id = Uuid::new_v4();
        db.create(&new_photo(event_id, Utc::now())).await.unwrap();
        db.create(&new_photo(event_id, Utc::now())).await.unwrap();

        assert_eq!(db.delete_by_event_id(event_id).await.unwrap(), 2);
        assert_eq!(db.delete_by_event_id(event_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_injected_insert_failure() {
        let db = MemoryDatabase::new();
        db.fail_photo_create(true);

        let result = db.create(&new_photo(Uuid::new_v4(), Utc::now())).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
        assert!(db.photos().is_empty());
    }
}
