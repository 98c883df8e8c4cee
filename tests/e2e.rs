//! End-to-end extraction against a real vision model.
//!
//! These tests read provider catalogues from `./test_cases/` and make live
//! model calls. They are gated behind the `E2E_ENABLED` environment variable
//! so they do not run in CI unless explicitly requested. PDF catalogues also
//! need the pdfium library (`PDFIUM_LIB_PATH`).
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_extract_pdf_catalogue -- --nocapture

use std::path::PathBuf;
use zirkel_inventory::{
    extract_file, write_records, CandidatePolicy, ExtractedMediaRecord, PdfEngine, PipelineConfig, PipelineError,
    RetryPolicy,
};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP - set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP - test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn live_config(policy: CandidatePolicy) -> PipelineConfig {
    PipelineConfig::builder()
        .candidate_policy(policy)
        .retry(RetryPolicy::default())
        .build()
        .expect("valid config")
}

/// Assert the records satisfy the invariants a reconciler relies on.
fn assert_records_sane(records: &[ExtractedMediaRecord], page_count: u32, context: &str) {
    assert!(!records.is_empty(), "[{context}] No records extracted");
    for (i, r) in records.iter().enumerate() {
        assert!(
            (1..=page_count).contains(&r.page),
            "[{context}] record {i} on page {} outside 1..={page_count}",
            r.page
        );
        for (name, value) in [("base", r.base), ("altura", r.altura), ("costo", r.costo)] {
            assert!(
                value.map_or(true, |v| v >= 0.0),
                "[{context}] record {i} has negative {name}: {value:?}"
            );
        }
        if let Some(uri) = &r.selected_image {
            assert!(
                uri.starts_with("data:image/jpeg;base64,"),
                "[{context}] record {i} image is not a JPEG data URI"
            );
        }
    }
    let with_image = records.iter().filter(|r| r.selected_image.is_some()).count();
    println!("[{context}] ✓  {} records, {with_image} with image", records.len());
}

// ── Extraction (needs model API) ─────────────────────────────────────────────

#[tokio::test]
async fn test_extract_pdf_catalogue() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("catalogo_carteleras.pdf"));

    let records = extract_file(&path, None, &PdfEngine::from_env(), &live_config(CandidatePolicy::AllCandidates))
        .await
        .expect("extraction should succeed");

    let page_count = lopdf::Document::load(&path).expect("readable PDF").get_pages().len() as u32;
    assert_records_sane(&records, page_count, "pdf");
    assert!(
        records.iter().any(|r| r.selected_image.is_some()),
        "[pdf] a photo catalogue should yield at least one site image"
    );

    write_records(output_dir().join("catalogo_carteleras.json"), &records)
        .await
        .expect("records written");
}

#[tokio::test]
async fn test_extract_pdf_catalogue_largest_only() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("catalogo_carteleras.pdf"));

    let records = extract_file(&path, None, &PdfEngine::from_env(), &live_config(CandidatePolicy::LargestOnly))
        .await
        .expect("extraction should succeed");

    let page_count = lopdf::Document::load(&path).expect("readable PDF").get_pages().len() as u32;
    assert_records_sane(&records, page_count, "pdf-largest");
}

#[tokio::test]
async fn test_extract_spreadsheet_listing() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("listado_muros.xlsx"));

    let records = extract_file(&path, None, &PdfEngine::from_env(), &live_config(CandidatePolicy::AllCandidates))
        .await
        .expect("extraction should succeed");

    let sheets = {
        use calamine::Reader;
        calamine::open_workbook_auto(&path).expect("readable workbook").sheet_names().len() as u32
    };
    assert_records_sane(&records, sheets, "xlsx");
    assert!(
        records.iter().all(|r| r.selected_image.is_none()),
        "[xlsx] spreadsheets carry no page images"
    );
}

#[tokio::test]
async fn test_extract_unsupported_file() {
    let path = e2e_skip_unless_ready!(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml"));

    let err = extract_file(&path, None, &PdfEngine::from_env(), &live_config(CandidatePolicy::AllCandidates))
        .await
        .expect_err("a TOML file is not a provider listing");
    assert!(matches!(err, PipelineError::UnsupportedDocument { .. }), "got {err:?}");
}
