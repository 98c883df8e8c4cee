//! [`DeckStore`] over the Google Drive v3 and Slides v1 REST APIs.
//!
//! Template copies go through Drive (`files/{id}/copy`, shared drives
//! included); reads and mutations go through Slides. Failures are classified
//! the same way as the Sheets store: 429 and quota reasons are rate limits,
//! 5xx and connection failures are transient.

use super::deck::{DeckStore, Presentation};
use crate::config::DeckConfig;
use crate::error::PortError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const SLIDES_API: &str = "https://slides.googleapis.com/v1";

#[derive(Debug, Deserialize)]
struct CopiedFile {
    id: Option<String>,
}

pub struct GoogleDeckStore {
    client: Client,
    access_token: String,
    drive_base: String,
    slides_base: String,
}

impl GoogleDeckStore {
    pub fn new(access_token: impl Into<String>) -> Result<Self, PortError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PortError::permanent("slides", format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            access_token: access_token.into(),
            drive_base: DRIVE_API.to_string(),
            slides_base: SLIDES_API.to_string(),
        })
    }

    pub fn from_config(config: &DeckConfig) -> Result<Self, PortError> {
        Self::new(&config.access_token)
    }

    /// Point the store at other endpoints (emulators, proxies).
    pub fn with_api_bases(mut self, drive: impl Into<String>, slides: impl Into<String>) -> Self {
        self.drive_base = drive.into().trim_end_matches('/').to_string();
        self.slides_base = slides.into().trim_end_matches('/').to_string();
        self
    }

    fn copy_url(&self, file_id: &str) -> String {
        format!("{}/files/{file_id}/copy", self.drive_base)
    }

    fn presentation_url(&self, presentation_id: &str, suffix: &str) -> String {
        format!("{}/presentations/{presentation_id}{suffix}", self.slides_base)
    }

    async fn send(&self, service: &str, request: RequestBuilder) -> Result<reqwest::Response, PortError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    PortError::transient(service, e.to_string())
                } else {
                    PortError::permanent(service, e.to_string())
                }
            })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PortError::from_http(service, status.as_u16(), &body))
    }
}

#[async_trait]
impl DeckStore for GoogleDeckStore {
    async fn copy_template(&self, template_id: &str, name: &str, folder_id: &str) -> Result<String, PortError> {
        debug!("Copying template {template_id} as {name}");
        let response = self
            .send(
                "drive",
                self.client
                    .post(self.copy_url(template_id))
                    .query(&[("supportsAllDrives", "true")])
                    .json(&json!({ "name": name, "parents": [folder_id] })),
            )
            .await?;
        let copied: CopiedFile = response
            .json()
            .await
            .map_err(|e| PortError::permanent("drive", format!("bad copy payload: {e}")))?;
        copied
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PortError::permanent("drive", "copy returned no file id"))
    }

    async fn batch_update(&self, presentation_id: &str, requests: Vec<Value>) -> Result<(), PortError> {
        debug!("batchUpdate {presentation_id} ({} requests)", requests.len());
        self.send(
            "slides",
            self.client
                .post(self.presentation_url(presentation_id, ":batchUpdate"))
                .json(&json!({ "requests": requests })),
        )
        .await?;
        Ok(())
    }

    async fn get(&self, presentation_id: &str) -> Result<Presentation, PortError> {
        let response = self
            .send("slides", self.client.get(self.presentation_url(presentation_id, "")))
            .await?;
        response
            .json()
            .await
            .map_err(|e| PortError::permanent("slides", format!("bad presentation payload: {e}")))
    }
}
