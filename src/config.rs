use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub upload: UploadConfig,
    pub content_store: ContentStoreConfig,
    pub rendition: RenditionConfig,
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_file_size: usize,
    pub allowed_mime_types: Vec<String>,
    pub max_image_dimension: u32,
    /// Shared deadline for both destination writes.
    pub write_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentBackend {
    Local,
    S3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentStoreConfig {
    pub backend: ContentBackend,
    pub local_path: String,
    pub s3_bucket: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub s3_force_path_style: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenditionConfig {
    pub api_base: String,
    pub account_id: String,
    pub api_token: String,
    /// Host serving derived variants, combined with `account_hash`.
    pub delivery_base: String,
    pub account_hash: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl UploadConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    /// Loads `.env`, then environment variables. Nested keys use `__`,
    /// e.g. `UPLOAD__MAX_FILE_SIZE` or `CONTENT_STORE__BACKEND=s3`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load(Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::default()
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("upload.allowed_mime_types")
    }

    pub fn load(environment: config::Environment) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("database_url", "postgresql://localhost/event_photos")?
            .set_default("database_max_connections", 20)?
            .set_default("port", 3000)?
            .set_default("upload.max_file_size", 10_485_760)? // 10MB
            .set_default(
                "upload.allowed_mime_types",
                vec!["image/jpeg", "image/png", "image/webp", "image/gif"],
            )?
            .set_default("upload.max_image_dimension", 12_000)?
            .set_default("upload.write_timeout_secs", 60)?
            .set_default("content_store.backend", "local")?
            .set_default("content_store.local_path", "./uploads")?
            .set_default("content_store.s3_region", "auto")?
            .set_default("content_store.s3_force_path_style", false)?
            .set_default("rendition.api_base", "https://api.cloudflare.com/client/v4")?
            .set_default("rendition.account_id", "")?
            .set_default("rendition.api_token", "")?
            .set_default("rendition.delivery_base", "https://imagedelivery.net")?
            .set_default("rendition.account_hash", "")?
            .set_default("rendition.request_timeout_secs", 30)?
            .set_default("sweeper.enabled", true)?
            .set_default("sweeper.interval_secs", 86_400)? // 24h
            .add_source(environment)
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
