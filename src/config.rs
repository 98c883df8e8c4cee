//! Configuration types for extraction, reconciliation and proposal assembly.
//!
//! Extraction behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The remote stores each get a small config of
//! their own ([`InventoryConfig`], [`DeckConfig`]) that can be read from the
//! environment with `from_env()`.
//!
//! # Design choice: builder over constructor
//! Most callers only change the model and maybe the retry policy. The builder
//! lets them set exactly that and rely on documented defaults for the rest.

use crate::error::PipelineError;
use crate::pipeline::llm::GenerativeModel;
use crate::progress::ProgressCallback;
use crate::retry::RetryPolicy;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

// ── Environment variable names ───────────────────────────────────────────

pub const ENV_SHEETS_ID: &str = "GOOGLE_SHEETS_ID";
pub const ENV_ACCESS_TOKEN: &str = "GOOGLE_ACCESS_TOKEN";
pub const ENV_SLIDES_TEMPLATE: &str = "GOOGLE_SLIDES_PROPOSAL_TEMPLATE";
pub const ENV_PROPOSAL_FOLDER: &str = "GOOGLE_DRIVE_PROPOSAL_FOLDER";
pub const ENV_IMAGES_PATH: &str = "IMAGES_PATH";
pub const ENV_PUBLIC_BASE_URL: &str = "PUBLIC_API_BASE_URL";
pub const ENV_PDFIUM_LIB_PATH: &str = "PDFIUM_LIB_PATH";

/// Default public base URL for companion images.
pub const DEFAULT_IMAGE_BASE_URL: &str = "http://localhost:3002";

/// Read a required environment variable; empty counts as missing.
pub fn required_env(name: &str) -> Result<String, PipelineError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(PipelineError::MissingConfiguration {
            name: name.to_string(),
        }),
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Configuration for document extraction.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use zirkel_inventory::{CandidatePolicy, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .model("gemini-2.0-flash")
///     .provider_name("gemini")
///     .candidate_policy(CandidatePolicy::AllCandidates)
///     .selection_concurrency(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// LLM model identifier, e.g. "gemini-2.0-flash". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai").
    /// If None along with `provider`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed model port. Takes precedence over every provider field.
    ///
    /// Used by tests and by callers that route model traffic through their
    /// own gateway.
    pub generative_model: Option<Arc<dyn GenerativeModel>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Extraction is transcription, not writing; a near-zero temperature keeps
    /// field values faithful to the page.
    pub temperature: f32,

    /// Maximum tokens the model may generate for the structuring call. Default: 8192.
    ///
    /// One record costs roughly 250 output tokens; 8192 covers listings of
    /// about thirty sites.
    pub max_tokens: usize,

    /// Longest edge, in pixels, of page renders sent to the structurer. Default: 1600.
    pub max_rendered_pixels: u32,

    /// Longest edge, in pixels, of candidate thumbnails. Default: 600.
    ///
    /// Thumbnails are never upscaled past the source raster.
    pub thumbnail_edge: u32,

    /// Which candidates a page contributes to image selection. Default: all.
    pub candidate_policy: CandidatePolicy,

    /// Concurrent image-selection calls. Default: 4.
    pub selection_concurrency: usize,

    /// Backoff policy shared by both model calls.
    pub retry: RetryPolicy,

    /// Custom extraction prompt. If None, uses [`crate::prompts::EXTRACTION_PROMPT`].
    pub extraction_prompt: Option<String>,

    /// Receives extraction progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            generative_model: None,
            temperature: 0.1,
            max_tokens: 8192,
            max_rendered_pixels: 1600,
            thumbnail_edge: 600,
            candidate_policy: CandidatePolicy::default(),
            selection_concurrency: 4,
            retry: RetryPolicy::default(),
            extraction_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "generative_model",
                &self.generative_model.as_ref().map(|m| m.name().to_string()),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("thumbnail_edge", &self.thumbnail_edge)
            .field("candidate_policy", &self.candidate_policy)
            .field("selection_concurrency", &self.selection_concurrency)
            .field("retry", &self.retry)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn generative_model(mut self, model: Arc<dyn GenerativeModel>) -> Self {
        self.config.generative_model = Some(model);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn thumbnail_edge(mut self, px: u32) -> Self {
        self.config.thumbnail_edge = px.max(16);
        self
    }

    pub fn candidate_policy(mut self, policy: CandidatePolicy) -> Self {
        self.config.candidate_policy = policy;
        self
    }

    pub fn selection_concurrency(mut self, n: usize) -> Self {
        self.config.selection_concurrency = n.max(1);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.retry.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "retry.max_attempts must be ≥ 1".into(),
            ));
        }
        if c.retry.backoff_factor < 1.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "retry.backoff_factor must be ≥ 1.0, got {}",
                c.retry.backoff_factor
            )));
        }
        Ok(self.config)
    }
}

/// Which image candidates a page contributes to selection.
///
/// Both policies exist because ranking every raster costs one model call per
/// record with several images attached, while the largest raster on a
/// listing page is usually, but not always, the site photograph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CandidatePolicy {
    /// Keep only the candidate with the largest on-page area.
    LargestOnly,
    /// Keep every candidate and let the model rank them. (default)
    #[default]
    AllCandidates,
}

// ── Inventory ────────────────────────────────────────────────────────────

/// Where the inventory spreadsheet lives and how its sheets are laid out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Spreadsheet document id.
    pub spreadsheet_id: String,
    /// OAuth bearer token with the spreadsheets scope.
    #[serde(skip_serializing)]
    pub access_token: String,
    /// Inventory sheet name. Default: `INVENTARIO`.
    pub inventory_sheet: String,
    /// Provider catalogue sheet name. Default: `PROVEEDORES`.
    pub providers_sheet: String,
    /// Last column read from the inventory sheet. Default: `Z`.
    pub last_column: String,
    /// Header substring marking the first protected (price) column. Default: `TARIFA`.
    pub price_marker: String,
    /// Public base URL under which `/media/<key>.jpeg` is served.
    pub image_base_url: String,
    /// Backoff policy for spreadsheet calls.
    pub retry: RetryPolicy,
}

impl InventoryConfig {
    pub fn new(spreadsheet_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            access_token: access_token.into(),
            inventory_sheet: "INVENTARIO".to_string(),
            providers_sheet: "PROVEEDORES".to_string(),
            last_column: "Z".to_string(),
            price_marker: "TARIFA".to_string(),
            image_base_url: DEFAULT_IMAGE_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Read `GOOGLE_SHEETS_ID`, `GOOGLE_ACCESS_TOKEN` and the optional
    /// `PUBLIC_API_BASE_URL`.
    pub fn from_env() -> Result<Self, PipelineError> {
        let mut config = Self::new(required_env(ENV_SHEETS_ID)?, required_env(ENV_ACCESS_TOKEN)?);
        if let Some(url) = optional_env(ENV_PUBLIC_BASE_URL) {
            config.image_base_url = url;
        }
        Ok(config)
    }

    /// Full-width range of the inventory sheet, e.g. `INVENTARIO!A:Z`.
    pub fn inventory_range(&self) -> String {
        format!("{}!A:{}", self.inventory_sheet, self.last_column)
    }

    /// Full-width range of the provider catalogue, `PROVEEDORES!A:AA`.
    pub fn providers_range(&self) -> String {
        format!("{}!A:AA", self.providers_sheet)
    }
}

// ── Proposal deck ────────────────────────────────────────────────────────

/// Where proposal decks come from and where they are filed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckConfig {
    /// Slide-deck template id.
    pub template_id: String,
    /// Drive folder receiving new proposals.
    pub folder_id: String,
    /// OAuth bearer token with the drive and presentations scopes.
    #[serde(skip_serializing)]
    pub access_token: String,
    /// Backoff policy for deck calls.
    pub retry: RetryPolicy,
}

impl DeckConfig {
    pub fn from_env() -> Result<Self, PipelineError> {
        Ok(Self {
            template_id: required_env(ENV_SLIDES_TEMPLATE)?,
            folder_id: required_env(ENV_PROPOSAL_FOLDER)?,
            access_token: required_env(ENV_ACCESS_TOKEN)?,
            retry: RetryPolicy::default(),
        })
    }
}

/// Directory holding companion images, from `IMAGES_PATH`.
pub fn images_path_from_env() -> Result<PathBuf, PipelineError> {
    required_env(ENV_IMAGES_PATH).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documentation() {
        let c = PipelineConfig::default();
        assert_eq!(c.temperature, 0.1);
        assert_eq!(c.max_tokens, 8192);
        assert_eq!(c.thumbnail_edge, 600);
        assert_eq!(c.candidate_policy, CandidatePolicy::AllCandidates);
        assert_eq!(c.retry.max_attempts, 5);
    }

    #[test]
    fn builder_clamps_values() {
        let c = PipelineConfig::builder()
            .temperature(5.0)
            .selection_concurrency(0)
            .thumbnail_edge(1)
            .build()
            .unwrap();
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.selection_concurrency, 1);
        assert_eq!(c.thumbnail_edge, 16);
    }

    #[test]
    fn build_rejects_zero_attempts() {
        let err = PipelineConfig::builder()
            .retry(RetryPolicy {
                max_attempts: 0,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn inventory_ranges() {
        let c = InventoryConfig::new("sheet", "token");
        assert_eq!(c.inventory_range(), "INVENTARIO!A:Z");
        assert_eq!(c.providers_range(), "PROVEEDORES!A:AA");
        assert_eq!(c.image_base_url, "http://localhost:3002");
    }

    #[test]
    fn missing_env_is_reported_by_name() {
        let err = required_env("ZIRKEL_TEST_SURELY_UNSET_VARIABLE").unwrap_err();
        assert!(err.to_string().contains("ZIRKEL_TEST_SURELY_UNSET_VARIABLE"));
    }

    #[test]
    fn access_token_is_not_serialized() {
        let c = InventoryConfig::new("sheet", "secret-token");
        let json = serde_json::to_string(&c).unwrap();
        assert!(!json.contains("secret-token"));
    }
}
