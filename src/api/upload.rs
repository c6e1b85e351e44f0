//! Image host integration (imgbb).
//!
//! Form images are uploaded to the image host first; only the returned URL is
//! sent to the backend.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ImageHostConfig;
use crate::error::ClientError;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    data: Option<UploadData>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    url: Option<String>,
}

/// Interpret an image host answer. Anything but `success: true` with a URL
/// is an upload error.
pub fn parse_upload_response(status: u16, body: &[u8]) -> Result<String, ClientError> {
    if !(200..300).contains(&status) {
        return Err(ClientError::Upload(format!(
            "image host returned {}: {}",
            status,
            super::transport::error_message(body)
        )));
    }

    let response: UploadResponse = serde_json::from_slice(body)
        .map_err(|e| ClientError::Upload(format!("unreadable response: {}", e)))?;
    if !response.success {
        return Err(ClientError::Upload("image host reported failure".to_string()));
    }

    response
        .data
        .and_then(|d| d.url)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ClientError::Upload("response carried no image URL".to_string()))
}

#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Upload the image and return its public URL.
    async fn upload(&self, file_name: &str, content: Bytes) -> Result<String, ClientError>;
}

/// Uploads through the imgbb HTTP API with a multipart `image` field.
pub struct ImgbbUploader {
    upload_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl ImgbbUploader {
    pub fn new(config: &ImageHostConfig, timeout: Duration) -> Result<Self, ClientError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ClientError::Upload("no image host API key configured".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            upload_url: config.upload_url.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl ImageUploader for ImgbbUploader {
    async fn upload(&self, file_name: &str, content: Bytes) -> Result<String, ClientError> {
        let mime = mime_guess::from_path(file_name).first_or_octet_stream();
        let size = content.len();
        let part = reqwest::multipart::Part::bytes(content.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime.as_ref())
            .map_err(|e| ClientError::Upload(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("image", part);

        debug!(file = %file_name, bytes = size, "Uploading image");
        let response = self
            .client
            .post(&self.upload_url)
            .query(&[("key", self.api_key.as_str())])
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Image upload request failed");
                ClientError::Upload(e.to_string())
            })?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        let url = parse_upload_response(status, &body)?;
        info!(file = %file_name, url = %url, "Image uploaded");
        Ok(url)
    }
}

/// Read a file from disk and upload it.
pub async fn upload_file(uploader: &dyn ImageUploader, path: &Path) -> Result<String, ClientError> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| ClientError::Upload(format!("cannot read {}: {}", path.display(), e)))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    uploader.upload(&file_name, Bytes::from(content)).await
}

/// Image slot of a form: the uploaded URL, if any, and whether an upload is
/// in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingImage {
    url: Option<String>,
    uploading: bool,
}

impl PendingImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            uploading: false,
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }

    /// URL to submit, or an empty string when no image was chosen.
    pub fn value(&self) -> String {
        self.url.clone().unwrap_or_default()
    }

    /// Upload `content`. The flag is set for the duration of the call; a
    /// failure keeps the previous URL.
    pub async fn upload(
        &mut self,
        uploader: &dyn ImageUploader,
        file_name: &str,
        content: Bytes,
    ) -> Result<&str, ClientError> {
        self.uploading = true;
        let result = uploader.upload(file_name, content).await;
        self.uploading = false;

        let url = result?;
        Ok(self.url.insert(url).as_str())
    }
}
