//! [`TabularStore`] over the Google Sheets v4 values REST API.
//!
//! Authentication is an already issued OAuth bearer token; minting tokens from
//! service-account keys is left to the deployment (e.g. `gcloud auth
//! print-access-token` or a metadata-server sidecar).
//!
//! Failures are classified here, at the port boundary: HTTP 429 and quota
//! reasons in the error payload are [`ErrorClass::RateLimited`], 5xx and
//! connection failures are [`ErrorClass::Transient`], everything else is
//! permanent.
//!
//! [`ErrorClass::RateLimited`]: crate::error::ErrorClass::RateLimited
//! [`ErrorClass::Transient`]: crate::error::ErrorClass::Transient

use super::store::{Rows, TabularStore};
use crate::config::InventoryConfig;
use crate::error::PortError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SERVICE: &str = "sheets";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Rows,
}

pub struct GoogleSheetsStore {
    client: Client,
    spreadsheet_id: String,
    access_token: String,
    api_base: String,
}

impl GoogleSheetsStore {
    pub fn new(spreadsheet_id: impl Into<String>, access_token: impl Into<String>) -> Result<Self, PortError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PortError::permanent(SERVICE, format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            spreadsheet_id: spreadsheet_id.into(),
            access_token: access_token.into(),
            api_base: SHEETS_API.to_string(),
        })
    }

    pub fn from_config(config: &InventoryConfig) -> Result<Self, PortError> {
        Self::new(&config.spreadsheet_id, &config.access_token)
    }

    /// Point the store at another endpoint (emulators, proxies).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// `{base}/{id}/values/{range}{suffix}` with the range as one path segment.
    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, PortError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| PortError::permanent(SERVICE, format!("bad API base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| PortError::permanent(SERVICE, "API base cannot hold a path"))?
            .pop_if_empty()
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&format!("{range}{suffix}"));
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, PortError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    PortError::transient(SERVICE, e.to_string())
                } else {
                    PortError::permanent(SERVICE, e.to_string())
                }
            })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PortError::from_http(SERVICE, status.as_u16(), &body))
    }
}

#[async_trait]
impl TabularStore for GoogleSheetsStore {
    async fn read(&self, range: &str) -> Result<Rows, PortError> {
        let url = self.values_url(range, "")?;
        debug!("GET values {range}");
        let response = self
            .send(
                self.client
                    .get(url)
                    .query(&[("valueRenderOption", "UNFORMATTED_VALUE")]),
            )
            .await?;
        let body: ValueRange = response
            .json()
            .await
            .map_err(|e| PortError::permanent(SERVICE, format!("bad values payload: {e}")))?;
        Ok(body.values)
    }

    async fn write(&self, range: &str, rows: Rows) -> Result<(), PortError> {
        let url = self.values_url(range, "")?;
        debug!("PUT values {range} ({} rows)", rows.len());
        self.send(
            self.client
                .put(url)
                .query(&[("valueInputOption", "RAW")])
                .json(&json!({ "range": range, "majorDimension": "ROWS", "values": rows })),
        )
        .await?;
        Ok(())
    }

    async fn append(&self, range: &str, rows: Rows) -> Result<(), PortError> {
        let url = self.values_url(range, ":append")?;
        debug!("POST append {range} ({} rows)", rows.len());
        self.send(
            self.client
                .post(url)
                .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
                .json(&json!({ "majorDimension": "ROWS", "values": rows })),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_a_single_encoded_segment() {
        let store = GoogleSheetsStore::new("sheet-id", "token").unwrap();
        let url = store.values_url("INVENTARIO!A5:M5", "").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-id/values/INVENTARIO!A5:M5"
        );
        let url = store.values_url("MY SHEET!A:Z", ":append").unwrap();
        assert!(url.as_str().ends_with("/values/MY%20SHEET!A:Z:append"), "{url}");
    }

    #[test]
    fn api_base_can_be_overridden() {
        let store = GoogleSheetsStore::new("id", "t")
            .unwrap()
            .with_api_base("http://127.0.0.1:9000/v4/spreadsheets/");
        let url = store.values_url("S!A:B", "").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/v4/spreadsheets/id/values/S!A:B");
    }
}
