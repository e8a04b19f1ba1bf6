use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{Event, NewPhoto, Photo, User};

pub mod memory;
pub mod queries;

pub use memory::MemoryDatabase;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Event>>;

    async fn get_by_url(&self, url: &str) -> Result<Option<Event>>;

    /// Overwrites every mutable column with the given record.
    async fn update(&self, event: &Event) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Events whose expiry lies strictly before `before`.
    async fn find_expired(&self, before: DateTime<Utc>) -> Result<Vec<Event>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Overwrites every mutable column with the given record.
    async fn update(&self, user: &User) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PhotoRepository: Send + Sync {
    async fn create(&self, photo: &NewPhoto) -> Result<Photo>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Photo>>;

    /// Newest first.
    async fn get_by_event_id(&self, event_id: Uuid) -> Result<Vec<Photo>>;

    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Returns the number of rows removed.
    async fn delete_by_event_id(&self, event_id: Uuid) -> Result<u64>;

    async fn count_by_event_id(&self, event_id: Uuid) -> Result<i64>;
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Builds the pool without opening a connection until first use.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().connect_lazy(database_url)?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
