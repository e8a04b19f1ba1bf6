#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use event_photos::{
    config::UploadConfig,
    database::MemoryDatabase,
    models::{Event, User},
    services::{DualDestinationWriter, ExpirySweeper, PhotoService},
    storage::memory::{MemoryContentStore, MemoryRenditionStore},
    utils::{KeyGenerator, ManualClock},
};
use image::{ImageBuffer, ImageOutputFormat, Rgb};
use std::{io::Cursor, sync::Arc};
use uuid::Uuid;

pub const DELIVERY_BASE: &str = "https://images.example.test";

pub struct TestApp {
    pub db: Arc<MemoryDatabase>,
    pub content: Arc<MemoryContentStore>,
    pub renditions: Arc<MemoryRenditionStore>,
    pub clock: Arc<ManualClock>,
    pub writer: DualDestinationWriter,
    pub photos: PhotoService,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_timeout(std::time::Duration::from_secs(5))
    }

    pub fn with_timeout(timeout: std::time::Duration) -> Self {
        let db = Arc::new(MemoryDatabase::new());
        let content = Arc::new(MemoryContentStore::new());
        let renditions = Arc::new(MemoryRenditionStore::new(DELIVERY_BASE));
        let clock = Arc::new(ManualClock::new(start_time()));
        let writer = DualDestinationWriter::new(
            content.clone(),
            renditions.clone(),
            clock.clone(),
            Arc::new(KeyGenerator::seeded(42)),
            timeout,
        );
        let photos = PhotoService::new(
            db.clone(),
            db.clone(),
            db.clone(),
            writer.clone(),
            clock.clone(),
            upload_config(),
        );

        Self {
            db,
            content,
            renditions,
            clock,
            writer,
            photos,
        }
    }

    pub fn sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(
            self.db.clone(),
            self.db.clone(),
            self.db.clone(),
            self.writer.clone(),
            self.clock.clone(),
        )
    }

    pub fn seed_user(&self, photo_allowance: i32, event_allowance: i32) -> User {
        let now = start_time();
        let user = User {
            id: Uuid::new_v4(),
            full_name: "Test User".to_string(),
            email: format!("{}@example.com", Uuid::new_v4().simple()),
            photo_allowance,
            event_allowance,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_user(user.clone());
        user
    }

    pub fn seed_event(&self, owner: &User, configure: impl FnOnce(&mut Event)) -> Event {
        let now = start_time();
        let mut event = Event {
            id: Uuid::new_v4(),
            user_id: owner.id,
            title: "Summer Party".to_string(),
            url: Uuid::new_v4().simple().to_string(),
            is_public: true,
            allow_guest_uploads: true,
            password_hash: None,
            photo_limit: None,
            photo_count: 0,
            expires_at: now + Duration::days(7),
            created_at: now,
            updated_at: now,
        };
        configure(&mut event);
        self.db.insert_event(event.clone());
        event
    }

    pub fn owner_allowance(&self, user: &User) -> i32 {
        self.db.user(user.id).map(|u| u.photo_allowance).unwrap_or_default()
    }

    pub fn photo_count(&self, event: &Event) -> i32 {
        self.db.event(event.id).map(|e| e.photo_count).unwrap_or_default()
    }
}

pub fn start_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn upload_config() -> UploadConfig {
    UploadConfig {
        max_file_size: 1 << 20,
        allowed_mime_types: vec![
            "image/jpeg".to_string(),
            "image/png".to_string(),
            "image/webp".to_string(),
        ],
        max_image_dimension: 4_096,
        write_timeout_secs: 5,
    }
}

pub fn png_bytes() -> Vec<u8> {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(8, 6, Rgb([200, 40, 90]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .unwrap();
    buf
}
