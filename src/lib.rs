//! # zirkel-inventory
//!
//! Turn provider listings of out-of-home advertising sites (billboards,
//! walls, screens) into rows of a shared spreadsheet inventory, and turn
//! inventory rows back into client-facing proposal decks.
//!
//! ## Why this crate?
//!
//! Providers send their catalogues as PDFs, Excel workbooks or CSV exports,
//! each with its own layout. Instead of a parser per provider, every page is
//! handed to a vision model that transcribes the sites into one fixed record
//! shape, and a second, much smaller model call picks the site photograph out
//! of the rasters embedded in the page the site was listed on.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (PDF / XLSX / CSV)
//!  │
//!  ├─ 1. Prepare    numbered pages: pdfium renders, calamine/csv sheets as text
//!  ├─ 2. Discover   embedded rasters per PDF page via lopdf (JPEG thumbnails)
//!  ├─ 3. Structure  one model call → validated ExtractedMediaRecord list
//!  ├─ 4. Select     one model call per record → best candidate, or none
//!  ├─ 5. Reconcile  upsert into the inventory sheet, price columns untouched
//!  └─ 6. Propose    copy the slide template, one slide per inventory item
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zirkel_inventory::{extract_file, PdfEngine, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = PipelineConfig::default();
//!     let records = extract_file("catalogo.pdf", None, &PdfEngine::from_env(), &config).await?;
//!     for record in &records {
//!         eprintln!("{} {} (page {}): image={}",
//!             record.tipo_medio, record.ciudad, record.page, record.selected_image.is_some());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `zirkel` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when embedding the library in a service:
//! ```toml
//! zirkel-inventory = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod inventory;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod proposal;
pub mod records;
pub mod retry;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CandidatePolicy, DeckConfig, InventoryConfig, PipelineConfig, PipelineConfigBuilder};
pub use error::{ErrorClass, ImageIssue, PipelineError, PortError};
pub use extract::{extract, extract_file, extract_prepared, extract_sync, write_records, PreparedDocument};
pub use inventory::{
    GoogleSheetsStore, ImageStore, Inventory, MemoryStore, Provider, ReconcileReport, TabularStore, ZirkelKey,
};
pub use pipeline::document::{PreparedPage, RawDocument};
pub use pipeline::images::PageCandidates;
pub use pipeline::llm::{GenerativeModel, ModelReply, ModelRequest, RequestKind};
pub use pipeline::render::PdfEngine;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use proposal::{DeckStore, GoogleDeckStore, Presentation, ProposalAssembler, ProposalHandle};
pub use records::{ExtractedMediaRecord, InventoryItem, InventoryRecord};
pub use retry::RetryPolicy;
