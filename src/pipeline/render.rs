//! PDF rasterisation through an explicit pdfium binding context.
//!
//! [`PdfEngine`] says *where* pdfium lives (a directory holding the platform
//! library, or the system library) and is constructed once per process and
//! handed to every call that needs pages rendered. There is no global,
//! lazily-initialised handle.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations, preventing the Tokio worker
//! threads from stalling during CPU-heavy rendering.
//!
//! ## Why cap pixels, not DPI?
//!
//! Listing pages range from letter-size sheets to poster-sized catalogue
//! spreads. `max_rendered_pixels` caps the longest edge regardless of physical
//! size, keeping memory bounded while price tables stay legible to the model.

use super::document::PreparedPage;
use super::encode::encode_page;
use crate::config::ENV_PDFIUM_LIB_PATH;
use crate::error::PipelineError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// How to bind pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfEngine {
    library_dir: Option<PathBuf>,
}

impl PdfEngine {
    /// Bind to the system pdfium library.
    pub fn system() -> Self {
        Self::default()
    }

    /// Bind to the platform library file inside `dir`.
    pub fn with_library_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: Some(dir.into()),
        }
    }

    /// `PDFIUM_LIB_PATH` when set, otherwise the system library.
    pub fn from_env() -> Self {
        match std::env::var(ENV_PDFIUM_LIB_PATH) {
            Ok(dir) if !dir.trim().is_empty() => Self::with_library_dir(dir),
            _ => Self::system(),
        }
    }

    pub fn library_dir(&self) -> Option<&Path> {
        self.library_dir.as_deref()
    }

    fn bind(&self) -> Result<Pdfium, PipelineError> {
        let bindings = match &self.library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| PipelineError::PdfiumBindingFailed(format!("{e:?}")))?;
        Ok(Pdfium::new(bindings))
    }

    /// Render every page of an in-memory PDF to a PNG attachment, alongside
    /// the page's own text layer.
    pub async fn render_pages(&self, bytes: Arc<Vec<u8>>, max_pixels: u32) -> Result<Vec<PreparedPage>, PipelineError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.render_pages_blocking(&bytes, max_pixels))
            .await
            .map_err(|e| PipelineError::Internal(format!("Render task panicked: {e}")))?
    }

    fn render_pages_blocking(&self, bytes: &[u8], max_pixels: u32) -> Result<Vec<PreparedPage>, PipelineError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| PipelineError::DocumentUnreadable {
                kind: "PDF".into(),
                detail: format!("{e:?}"),
            })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);

        let render_config = PdfRenderConfig::new()
            .set_target_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let mut results = Vec::with_capacity(total_pages);
        for idx in 0..total_pages {
            let number = idx as u32 + 1;
            let unreadable = |e: PdfiumError| PipelineError::DocumentUnreadable {
                kind: "PDF".into(),
                detail: format!("page {number}: {e:?}"),
            };

            let page = pages.get(idx as u16).map_err(unreadable)?;
            let text = page.text().map(|t| t.all()).unwrap_or_default();
            let image = page.render_with_config(&render_config).map_err(unreadable)?.as_image();
            debug!("Rendered page {} → {}x{} px", number, image.width(), image.height());

            let image = encode_page(&image).map_err(|e| PipelineError::Internal(format!("PNG encode: {e}")))?;
            results.push(PreparedPage {
                number,
                text: text.trim().to_string(),
                image: Some(image),
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_records_library_location() {
        assert!(PdfEngine::system().library_dir().is_none());
        let engine = PdfEngine::with_library_dir("/opt/pdfium/lib");
        assert_eq!(engine.library_dir(), Some(Path::new("/opt/pdfium/lib")));
    }
}
