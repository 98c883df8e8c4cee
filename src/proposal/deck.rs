//! The slide-deck port and the slice of the presentation model it returns.
//!
//! Only the fields the assembler reads are modelled; everything else in the
//! Slides payload is ignored on deserialisation.

use crate::error::PortError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[async_trait]
pub trait DeckStore: Send + Sync {
    /// Service name used in logs and errors.
    fn service(&self) -> &str {
        "slides"
    }

    /// Copy `template_id` into `folder_id` as `name`; returns the new id.
    async fn copy_template(&self, template_id: &str, name: &str, folder_id: &str) -> Result<String, PortError>;

    /// Apply `requests` (Slides `batchUpdate` request objects) in order.
    async fn batch_update(&self, presentation_id: &str, requests: Vec<Value>) -> Result<(), PortError>;

    async fn get(&self, presentation_id: &str) -> Result<Presentation, PortError>;
}

#[async_trait]
impl<T: DeckStore + ?Sized> DeckStore for std::sync::Arc<T> {
    fn service(&self) -> &str {
        (**self).service()
    }

    async fn copy_template(&self, template_id: &str, name: &str, folder_id: &str) -> Result<String, PortError> {
        (**self).copy_template(template_id, name, folder_id).await
    }

    async fn batch_update(&self, presentation_id: &str, requests: Vec<Value>) -> Result<(), PortError> {
        (**self).batch_update(presentation_id, requests).await
    }

    async fn get(&self, presentation_id: &str) -> Result<Presentation, PortError> {
        (**self).get(presentation_id).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
    #[serde(default)]
    pub presentation_id: String,
    #[serde(default)]
    pub slides: Vec<Slide>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    pub object_id: String,
    #[serde(default)]
    pub page_elements: Vec<PageElement>,
}

impl Slide {
    pub fn table(&self) -> Option<&PageElement> {
        self.page_elements.iter().find(|e| e.table.is_some())
    }

    /// The first shape whose text contains `marker`.
    pub fn shape_containing(&self, marker: &str) -> Option<&PageElement> {
        self.page_elements
            .iter()
            .find(|e| e.shape.is_some() && e.text().contains(marker))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageElement {
    pub object_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Shape>,
}

impl PageElement {
    /// Concatenated text runs of a shape; empty for anything else.
    pub fn text(&self) -> String {
        self.shape
            .as_ref()
            .and_then(|s| s.text.as_ref())
            .map(|t| {
                t.text_elements
                    .iter()
                    .filter_map(|e| e.text_run.as_ref())
                    .map(|r| r.content.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    #[serde(default)]
    pub text_elements: Vec<TextElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_run: Option<TextRun>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    #[serde(default)]
    pub content: String,
}
