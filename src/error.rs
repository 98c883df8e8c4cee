//! Error types for the zirkel-inventory library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`PipelineError`] - **Fatal**: the call cannot complete (unreadable
//!   document, model reply that is not valid JSON, inventory write that kept
//!   failing). Returned as `Err(PipelineError)` from the top-level entry points.
//!
//! * [`ImageIssue`] - **Non-fatal**: one image could not be resolved, or the
//!   model picked an index that does not exist. The record simply proceeds
//!   without an image; the issue is only logged.
//!
//! * [`PortError`] - what a remote collaborator (generative model, spreadsheet,
//!   slide deck) reports back. Every port classifies its own failures into an
//!   [`ErrorClass`] so the retry loop never has to guess from message text.

use thiserror::Error;

/// All fatal errors returned by the zirkel-inventory library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Document errors ───────────────────────────────────────────────────
    /// The declared MIME type is not one the pipeline can prepare.
    #[error("Unsupported document type '{mime_type}'\nExpected PDF, CSV or an Excel workbook.")]
    UnsupportedDocument { mime_type: String },

    /// The bytes could not be opened as the declared document type.
    #[error("Document could not be read as {kind}: {detail}")]
    DocumentUnreadable { kind: String, detail: String },

    /// The model reply could not be parsed into extraction records.
    #[error("Extraction failed: {detail}")]
    ExtractionFailed { detail: String },

    /// A parsed record violates a record invariant.
    #[error("Record {index} is invalid: {detail}")]
    InvalidRecord { index: usize, detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model call failed with a non-retryable error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── Remote store errors ───────────────────────────────────────────────
    /// A remote call stayed rate-limited through every retry attempt.
    #[error("Rate limit exceeded for '{service}' after {attempts} attempts")]
    RateLimited { service: String, attempts: u32 },

    /// A spreadsheet read or write failed; the remaining batch was abandoned.
    #[error("Reconciliation failed: {detail}")]
    ReconciliationFailed { detail: String },

    /// The inventory header row cannot support reconciliation.
    #[error("Inventory sheet '{sheet}' is unusable: {detail}")]
    InventorySchema { sheet: String, detail: String },

    /// A record names a provider that is not in the provider catalogue.
    #[error("Unknown provider '{provider}'; add it to the provider sheet first")]
    UnknownProvider { provider: String },

    /// Slide-deck assembly failed.
    #[error("Proposal could not be created: {detail}")]
    ProposalFailed { detail: String },

    /// A companion image could not be written.
    #[error("Failed to store image for '{key}': {source}")]
    ImageStoreFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// A required credential or identifier is absent.
    #[error("Missing configuration: {name} is not set")]
    MissingConfiguration { name: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory holding libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Map a port failure that ended a model call.
    pub(crate) fn from_model(err: PortError) -> Self {
        match err.class {
            ErrorClass::RateLimited => PipelineError::RateLimited {
                service: err.service,
                attempts: err.attempts,
            },
            _ => PipelineError::LlmApiError {
                message: err.message,
            },
        }
    }

    /// Map a port failure that ended an inventory call.
    pub(crate) fn from_store(err: PortError) -> Self {
        match err.class {
            ErrorClass::RateLimited => PipelineError::RateLimited {
                service: err.service,
                attempts: err.attempts,
            },
            _ => PipelineError::ReconciliationFailed {
                detail: err.to_string(),
            },
        }
    }

    /// Map a port failure that ended a slide-deck call.
    pub(crate) fn from_deck(err: PortError) -> Self {
        match err.class {
            ErrorClass::RateLimited => PipelineError::RateLimited {
                service: err.service,
                attempts: err.attempts,
            },
            _ => PipelineError::ProposalFailed {
                detail: err.to_string(),
            },
        }
    }
}

/// A non-fatal image problem. The affected record proceeds without an image.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageIssue {
    /// A paint operation referenced an object that could not be decoded.
    #[error("Page {page}: image '{object}' skipped: {detail}")]
    Resolution {
        page: u32,
        object: String,
        detail: String,
    },

    /// The model answered the ranking prompt with no usable index.
    #[error("Image selection for page {page} ambiguous: {detail}")]
    SelectionAmbiguous { page: u32, detail: String },
}

/// How a remote failure should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorClass {
    /// Quota or rate limit hit; retry with backoff.
    RateLimited,
    /// Server-side hiccup (5xx, timeout); retried only when the policy allows.
    Transient,
    /// Bad request, auth failure, missing sheet; never retried.
    Permanent,
}

/// A failure reported by a remote port (model, spreadsheet, slide deck).
#[derive(Debug, Clone, Error)]
#[error("{service}: {message}")]
pub struct PortError {
    pub class: ErrorClass,
    pub service: String,
    pub message: String,
    /// Attempts made before giving up; filled in by the retry loop.
    pub attempts: u32,
}

impl PortError {
    pub fn new(class: ErrorClass, service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class,
            service: service.into(),
            message: message.into(),
            attempts: 1,
        }
    }

    pub fn rate_limited(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::RateLimited, service, message)
    }

    pub fn transient(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transient, service, message)
    }

    pub fn permanent(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Permanent, service, message)
    }

    /// Classify an HTTP status returned by a REST endpoint.
    ///
    /// Google APIs also report quota exhaustion as `403` with a
    /// `rateLimitExceeded` / `RESOURCE_EXHAUSTED` reason in the error body, so
    /// the parsed body status is consulted before the numeric code.
    pub fn from_http(service: impl Into<String>, status: u16, body: &str) -> Self {
        let reason = google_error_reason(body);
        let class = match (status, reason.as_deref()) {
            (429, _) => ErrorClass::RateLimited,
            (_, Some("RESOURCE_EXHAUSTED" | "rateLimitExceeded" | "userRateLimitExceeded")) => {
                ErrorClass::RateLimited
            }
            (500..=599, _) => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        };
        Self::new(class, service, format!("HTTP {status}: {}", body.trim()))
    }
}

/// Pull the machine-readable reason out of a Google API error payload.
///
/// ```json
/// {"error": {"code": 403, "status": "PERMISSION_DENIED",
///            "errors": [{"reason": "rateLimitExceeded"}]}}
/// ```
fn google_error_reason(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    if let Some(reason) = error
        .get("errors")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .and_then(|e| e.get("reason"))
        .and_then(|r| r.as_str())
    {
        return Some(reason.to_string());
    }
    error
        .get("status")
        .and_then(|s| s.as_str())
        .map(str::to_string)
}
