//! Extraction entry points: uploaded document → records with images.
//!
//! ## Two independent branches, one join
//!
//! ```text
//!               ┌─ prepare pages ─▶ structure (1 model call) ─┐
//! RawDocument ──┤                                             ├─▶ select per record
//!               └─ discover page image candidates ────────────┘   (N model calls)
//! ```
//!
//! Structuring needs the whole document; image discovery only needs pages.
//! They run concurrently and meet at selection, where each record is paired
//! with the candidates of the page it was found on.
//!
//! ## Why ordered buffering for selection?
//!
//! Selection calls are independent, so several run at once
//! (`selection_concurrency`). `buffered` (not `buffer_unordered`) keeps the
//! output in the structurer's order, which is the order the document lists
//! its sites in.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::document::{prepare_pages, DocumentKind, PreparedPage, RawDocument};
use crate::pipeline::images::{extract_document_candidates, PageCandidates};
use crate::pipeline::llm::{resolve_model, GenerativeModel};
use crate::pipeline::render::PdfEngine;
use crate::pipeline::select::select_best_image;
use crate::pipeline::structure::extract_records;
use crate::records::ExtractedMediaRecord;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// A document already split into pages, with its image candidates.
///
/// For callers that prepare pages another way, such as OCR output or a
/// renderer other than pdfium; see [`extract_prepared`].
#[derive(Debug, Clone, Default)]
pub struct PreparedDocument {
    pub pages: Vec<PreparedPage>,
    pub candidates: PageCandidates,
}

impl PreparedDocument {
    pub fn from_parts(pages: Vec<PreparedPage>, candidates: PageCandidates) -> Self {
        Self { pages, candidates }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Extract records, each with its selected image, from an uploaded document.
///
/// # Errors
/// * [`PipelineError::UnsupportedDocument`] / [`PipelineError::DocumentUnreadable`]
/// * [`PipelineError::ExtractionFailed`] - the structuring reply is not a record list
/// * [`PipelineError::InvalidRecord`] - a record points at a missing page or
///   carries a negative amount
/// * [`PipelineError::RateLimited`] / [`PipelineError::LlmApiError`] - the
///   structuring call failed for good
///
/// Image problems are never errors: affected records come back with
/// `selected_image: None`.
pub async fn extract(
    document: &RawDocument,
    engine: &PdfEngine,
    config: &PipelineConfig,
) -> Result<Vec<ExtractedMediaRecord>, PipelineError> {
    let start = Instant::now();
    info!("Starting extraction: {} ({} bytes)", document.mime_type, document.bytes.len());
    let model = resolve_model(config)?;

    let kind = document.kind()?;
    let structured = async {
        let pages = prepare_pages(document, engine, config.max_rendered_pixels).await?;
        if let Some(cb) = &config.progress_callback {
            cb.on_extraction_start(pages.len());
        }
        extract_records(model.as_ref(), &pages, config).await
    };
    let (records, candidates) = tokio::try_join!(structured, discover_candidates(document, kind, config))?;

    let records = select_images(model.as_ref(), records, &candidates, config).await;
    info!("Extraction complete: {} records in {:?}", records.len(), start.elapsed());
    Ok(records)
}

/// [`extract`] over a document that is already prepared.
pub async fn extract_prepared(
    prepared: &PreparedDocument,
    config: &PipelineConfig,
) -> Result<Vec<ExtractedMediaRecord>, PipelineError> {
    let model = resolve_model(config)?;
    if let Some(cb) = &config.progress_callback {
        cb.on_extraction_start(prepared.page_count());
    }
    let records = extract_records(model.as_ref(), &prepared.pages, config).await?;
    Ok(select_images(model.as_ref(), records, &prepared.candidates, config).await)
}

/// Read `path` and [`extract`] it. The MIME type defaults to the extension's.
pub async fn extract_file(
    path: impl AsRef<Path>,
    mime_type: Option<&str>,
    engine: &PdfEngine,
    config: &PipelineConfig,
) -> Result<Vec<ExtractedMediaRecord>, PipelineError> {
    let document = RawDocument::from_path(path.as_ref(), mime_type).await?;
    extract(&document, engine, config).await
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    document: &RawDocument,
    engine: &PdfEngine,
    config: &PipelineConfig,
) -> Result<Vec<ExtractedMediaRecord>, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(extract(document, engine, config))
}

/// Image candidates per page; only PDFs carry embedded rasters.
async fn discover_candidates(
    document: &RawDocument,
    kind: DocumentKind,
    config: &PipelineConfig,
) -> Result<PageCandidates, PipelineError> {
    if kind != DocumentKind::Pdf {
        return Ok(PageCandidates::new());
    }
    extract_document_candidates(document.bytes.clone(), config.candidate_policy, config.thumbnail_edge).await
}

/// Pair every record with the best candidate from its page.
async fn select_images(
    model: &dyn GenerativeModel,
    records: Vec<ExtractedMediaRecord>,
    candidates: &PageCandidates,
    config: &PipelineConfig,
) -> Vec<ExtractedMediaRecord> {
    let total = records.len();
    if let Some(cb) = &config.progress_callback {
        cb.on_records_structured(total);
    }
    let none: Vec<String> = Vec::new();

    let records: Vec<ExtractedMediaRecord> = stream::iter(records.into_iter().enumerate())
        .map(|(i, mut record)| {
            let page_candidates = candidates.get(&record.page).unwrap_or(&none);
            async move {
                if let Some(cb) = &config.progress_callback {
                    cb.on_selection_start(i + 1, total);
                }
                record.selected_image = select_best_image(model, page_candidates, &record, config).await;
                if let Some(cb) = &config.progress_callback {
                    cb.on_selection_complete(i + 1, total, record.selected_image.is_some());
                }
                record
            }
        })
        .buffered(config.selection_concurrency.max(1))
        .collect()
        .await;

    let with_image = records.iter().filter(|r| r.selected_image.is_some()).count();
    info!("Selected images for {with_image}/{total} records");
    if let Some(cb) = &config.progress_callback {
        cb.on_extraction_complete(total, with_image);
    }
    records
}

/// Write records as pretty JSON, atomically (temp file + rename).
pub async fn write_records(path: impl AsRef<Path>, records: &[ExtractedMediaRecord]) -> Result<(), PipelineError> {
    let path = path.as_ref();
    let json = serde_json::to_vec_pretty(records)
        .map_err(|e| PipelineError::Internal(format!("Serialising records: {e}")))?;
    let io_err = |e: std::io::Error| PipelineError::Internal(format!("Writing {}: {e}", path.display()));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await.map_err(io_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(io_err)?;
    Ok(())
}
