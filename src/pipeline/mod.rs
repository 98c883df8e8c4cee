//! Pipeline stages for document extraction.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a scripted model in tests) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─▶ document ──▶ render ──▶ encode ──▶ structure ──┐
//! RawDocument│   (MIME)       (pdfium)   (PNG)     (LLM call)   ├─▶ select ──▶ records
//!            └─▶ content ──▶ images ──▶ encode (JPEG thumbs) ───┘   (LLM call per record)
//!                (lopdf)    (resolve)
//! ```
//!
//! 1. [`document`]  - classify the upload and prepare numbered pages
//! 2. [`render`]    - rasterise PDF pages through an explicit [`render::PdfEngine`]
//! 3. [`encode`]    - PNG pages for structuring, JPEG thumbnails for candidates
//! 4. [`content`]   - typed operator stream of a page
//! 5. [`images`]    - resolve painted rasters into candidates per page
//! 6. [`structure`] - whole-document model call → validated records
//! 7. [`select`]    - per-record model call ranking that page's candidates
//! 8. [`llm`]       - the model port, its edgequake-llm adapter and retry

pub mod content;
pub mod document;
pub mod encode;
pub mod images;
pub mod llm;
pub mod render;
pub mod select;
pub mod structure;
