//! Uploaded documents and their preparation for the structuring call.
//!
//! A [`RawDocument`] is bytes plus a declared MIME type. Preparing it yields
//! numbered pages, each with text and (for PDFs) a rendered image:
//!
//! | Kind        | Pages                              | Images             |
//! |-------------|------------------------------------|--------------------|
//! | PDF         | one per PDF page (pdfium)          | rendered PNG       |
//! | CSV         | one, as a pipe-delimited table     | none               |
//! | Spreadsheet | one per worksheet (calamine)       | none               |

use super::render::PdfEngine;
use crate::error::PipelineError;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use edgequake_llm::ImageData;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_XLS: &str = "application/vnd.ms-excel";
pub const MIME_ODS: &str = "application/vnd.oasis.opendocument.spreadsheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Csv,
    Spreadsheet,
}

impl DocumentKind {
    /// Classify a declared MIME type; parameters such as `; charset=` are ignored.
    pub fn from_mime(mime_type: &str) -> Result<Self, PipelineError> {
        let essence = mime_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            MIME_PDF => Ok(Self::Pdf),
            MIME_CSV | "application/csv" => Ok(Self::Csv),
            MIME_XLSX | MIME_XLS | MIME_ODS => Ok(Self::Spreadsheet),
            _ => Err(PipelineError::UnsupportedDocument {
                mime_type: mime_type.to_string(),
            }),
        }
    }
}

/// MIME type for a file name, by extension.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "pdf" => MIME_PDF,
        "csv" => MIME_CSV,
        "xlsx" => MIME_XLSX,
        "xls" => MIME_XLS,
        "ods" => MIME_ODS,
        _ => return None,
    })
}

/// An uploaded file. Dropped once extraction returns.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub bytes: Arc<Vec<u8>>,
    pub mime_type: String,
}

impl RawDocument {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: Arc::new(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Read a file, taking the MIME type from `mime_type` or the extension.
    pub async fn from_path(path: &Path, mime_type: Option<&str>) -> Result<Self, PipelineError> {
        let mime = match mime_type {
            Some(m) => m.to_string(),
            None => mime_for_path(path)
                .ok_or_else(|| PipelineError::UnsupportedDocument {
                    mime_type: format!("unknown (extension of {})", path.display()),
                })?
                .to_string(),
        };
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::DocumentUnreadable {
                kind: mime.clone(),
                detail: format!("{}: {e}", path.display()),
            })?;
        Ok(Self::new(bytes, mime))
    }

    pub fn kind(&self) -> Result<DocumentKind, PipelineError> {
        DocumentKind::from_mime(&self.mime_type)
    }
}

/// One labelled unit of the structuring request.
#[derive(Debug, Clone)]
pub struct PreparedPage {
    /// 1-based page (or worksheet) number.
    pub number: u32,
    pub text: String,
    pub image: Option<ImageData>,
}

/// Turn `document` into numbered pages for the structuring call.
pub async fn prepare_pages(
    document: &RawDocument,
    engine: &PdfEngine,
    max_rendered_pixels: u32,
) -> Result<Vec<PreparedPage>, PipelineError> {
    let pages = match document.kind()? {
        DocumentKind::Pdf => engine.render_pages(Arc::clone(&document.bytes), max_rendered_pixels).await?,
        DocumentKind::Csv => csv_pages(&document.bytes)?,
        DocumentKind::Spreadsheet => {
            let bytes = Arc::clone(&document.bytes);
            tokio::task::spawn_blocking(move || spreadsheet_pages(&bytes))
                .await
                .map_err(|e| PipelineError::Internal(format!("Workbook task panicked: {e}")))??
        }
    };
    info!("Prepared {} pages from {}", pages.len(), document.mime_type);
    Ok(pages)
}

fn table_line<I, S>(cells: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let cells: Vec<String> = cells.into_iter().map(|c| c.as_ref().trim().to_string()).collect();
    if cells.iter().all(String::is_empty) {
        return None;
    }
    Some(format!("| {} |", cells.join(" | ")))
}

/// The whole CSV as a single pipe-delimited page.
pub fn csv_pages(bytes: &[u8]) -> Result<Vec<PreparedPage>, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| PipelineError::DocumentUnreadable {
            kind: "CSV".into(),
            detail: e.to_string(),
        })?;
        lines.extend(table_line(record.iter()));
    }
    debug!("CSV: {} non-empty rows", lines.len());
    Ok(vec![PreparedPage {
        number: 1,
        text: lines.join("\n"),
        image: None,
    }])
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

/// One page per worksheet, named in a heading line.
pub fn spreadsheet_pages(bytes: &[u8]) -> Result<Vec<PreparedPage>, PipelineError> {
    let unreadable = |detail: String| PipelineError::DocumentUnreadable {
        kind: "spreadsheet".into(),
        detail,
    };
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| unreadable(e.to_string()))?;

    let mut pages = Vec::new();
    for (i, name) in workbook.sheet_names().into_iter().enumerate() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| unreadable(format!("sheet '{name}': {e}")))?;
        let rows: Vec<String> = range
            .rows()
            .filter_map(|row| table_line(row.iter().map(cell_text)))
            .collect();
        debug!("Worksheet '{name}': {} non-empty rows", rows.len());
        pages.push(PreparedPage {
            number: i as u32 + 1,
            text: format!("Hoja: {name}\n{}", rows.join("\n")),
            image: None,
        });
    }
    if pages.is_empty() {
        return Err(unreadable("workbook has no worksheets".into()));
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_classification() {
        assert_eq!(DocumentKind::from_mime("application/pdf").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_mime("text/csv; charset=utf-8").unwrap(), DocumentKind::Csv);
        assert_eq!(DocumentKind::from_mime(MIME_XLSX).unwrap(), DocumentKind::Spreadsheet);
        assert!(matches!(
            DocumentKind::from_mime("image/png"),
            Err(PipelineError::UnsupportedDocument { .. })
        ));
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for_path(Path::new("Listado.PDF")), Some(MIME_PDF));
        assert_eq!(mime_for_path(Path::new("medios.xlsx")), Some(MIME_XLSX));
        assert_eq!(mime_for_path(Path::new("notes.txt")), None);
    }

    #[test]
    fn csv_becomes_one_pipe_table_page() {
        let csv = "CLAVE,CIUDAD,MEDIDAS\nPN-01,Monterrey,13.00 X 4.20\n,,\n\"PN-02\",\"Ciudad de México\",\"8 X 3\"\n";
        let pages = csv_pages(csv.as_bytes()).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 1);
        assert!(pages[0].image.is_none());
        let lines: Vec<&str> = pages[0].text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "| PN-01 | Monterrey | 13.00 X 4.20 |");
        assert_eq!(lines[2], "| PN-02 | Ciudad de México | 8 X 3 |");
    }

    #[test]
    fn garbage_workbook_is_unreadable() {
        assert!(matches!(
            spreadsheet_pages(b"not a workbook"),
            Err(PipelineError::DocumentUnreadable { .. })
        ));
    }
}
