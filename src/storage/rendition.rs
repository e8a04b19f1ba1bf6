use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::{
    config::RenditionConfig,
    errors::{AppError, Result},
    storage::{RenditionStore, StorageError, Variant},
};

/// Client for a hosted image-delivery API: upload once, serve named variants.
pub struct ImageDeliveryClient {
    http: Client,
    images_endpoint: String,
    api_token: String,
    delivery_base: String,
    account_hash: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    success: bool,
    result: Option<UploadedImage>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct UploadedImage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl ApiResponse {
    fn describe_errors(&self) -> String {
        if self.errors.is_empty() {
            return "no error details".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl ImageDeliveryClient {
    pub fn new(config: &RenditionConfig) -> Result<Self> {
        if config.account_id.is_empty()
            || config.api_token.is_empty()
            || config.account_hash.is_empty()
        {
            return Err(AppError::Config(
                "rendition.account_id, rendition.api_token and rendition.account_hash are required"
                    .to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            images_endpoint: format!(
                "{}/accounts/{}/images/v1",
                config.api_base.trim_end_matches('/'),
                config.account_id
            ),
            api_token: config.api_token.clone(),
            delivery_base: config.delivery_base.trim_end_matches('/').to_string(),
            account_hash: config.account_hash.clone(),
        })
    }
}

#[async_trait]
impl RenditionStore for ImageDeliveryClient {
    async fn upload(
        &self,
        data: Bytes,
        file_name: &str,
    ) -> std::result::Result<String, StorageError> {
        let part = multipart::Part::bytes(data.to_vec()).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(&self.images_endpoint)
            .bearer_auth(&self.api_token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body: ApiResponse = response.json().await.map_err(|e| {
            StorageError::Rejected(format!("unreadable response (status {}): {}", status, e))
        })?;

        match body.result {
            Some(ref image) if body.success => {
                debug!(image_id = %image.id, "Image uploaded to rendition store");
                Ok(image.id.clone())
            }
            _ => Err(StorageError::Rejected(format!(
                "upload failed with status {}: {}",
                status,
                body.describe_errors()
            ))),
        }
    }

    async fn delete(&self, image_id: &str) -> std::result::Result<(), StorageError> {
        let response = self
            .http
            .delete(format!("{}/{}", self.images_endpoint, image_id))
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            status => Err(StorageError::Rejected(format!(
                "delete of `{}` failed with status {}",
                image_id, status
            ))),
        }
    }

    fn derived_url(&self, image_id: &str, variant: Variant) -> String {
        format!(
            "{}/{}/{}/{}",
            self.delivery_base,
            self.account_hash,
            image_id,
            variant.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(api_base: &str) -> RenditionConfig {
        RenditionConfig {
            api_base: api_base.to_string(),
            account_id: "acct".to_string(),
            api_token: "token-123".to_string(),
            delivery_base: "https://imagedelivery.net/".to_string(),
            account_hash: "hash42".to_string(),
            request_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_upload_returns_image_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accounts/acct/images/v1"))
            .and(header("authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": { "id": "img-001" },
                "errors": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ImageDeliveryClient::new(&config(&server.uri())).unwrap();
        let id = client
            .upload(Bytes::from_static(b"\x89PNG fake"), "party.png")
            .await
            .unwrap();

        assert_eq!(id, "img-001");
    }

    #[tokio::test]
    async fn test_upload_rejection_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accounts/acct/images/v1"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "success": false,
                "result": null,
                "errors": [{ "code": 5400, "message": "Bad request" }]
            })))
            .mount(&server)
            .await;

        let client = ImageDeliveryClient::new(&config(&server.uri())).unwrap();
        let err = client
            .upload(Bytes::from_static(b"junk"), "junk.bin")
            .await
            .unwrap_err();

        match err {
            StorageError::Rejected(msg) => assert!(msg.contains("5400")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_treats_missing_image_as_done() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/accounts/acct/images/v1/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/accounts/acct/images/v1/locked"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ImageDeliveryClient::new(&config(&server.uri())).unwrap();
        client.delete("gone").await.unwrap();
        assert!(matches!(
            client.delete("locked").await,
            Err(StorageError::Rejected(_))
        ));
    }

    #[test]
    fn test_derived_urls_are_deterministic_per_variant() {
        let client = ImageDeliveryClient::new(&config("http://unused")).unwrap();

        let thumb = client.derived_url("img-001", Variant::Thumbnail);
        let public = client.derived_url("img-001", Variant::Public);

        assert_eq!(thumb, "https://imagedelivery.net/hash42/img-001/thumbnail");
        assert_eq!(public, "https://imagedelivery.net/hash42/img-001/public");
        assert_eq!(thumb, client.derived_url("img-001", Variant::Thumbnail));
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let mut cfg = config("http://unused");
        cfg.api_token.clear();
        assert!(matches!(
            ImageDeliveryClient::new(&cfg),
            Err(AppError::Config(_))
        ));
    }
}
