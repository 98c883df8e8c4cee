//! The tabular-store port the reconciler writes through.
//!
//! The reconciler never talks HTTP; it reads, writes and appends A1 ranges on
//! a [`TabularStore`]. [`super::sheets::GoogleSheetsStore`] is the production
//! implementation and [`super::memory::MemoryStore`] backs tests and dry runs.
//! Implementations classify their own failures into
//! [`crate::error::ErrorClass`] so the retry loop can act on them.

use crate::error::PortError;
use async_trait::async_trait;
use serde_json::Value;

/// One cell as the sheet reports it with unformatted values: a string, a
/// number, a bool, or an empty string for blank.
pub type Cell = Value;

/// Rows of cells. Trailing blank cells and rows may be omitted.
pub type Rows = Vec<Vec<Cell>>;

#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Service name used in logs and errors.
    fn service(&self) -> &str {
        "sheets"
    }

    /// Read every row of `range` (unformatted values).
    async fn read(&self, range: &str) -> Result<Rows, PortError>;

    /// Overwrite `range` with `rows`, starting at its top-left cell.
    async fn write(&self, range: &str, rows: Rows) -> Result<(), PortError>;

    /// Append `rows` after the last non-empty row of `range`'s table.
    async fn append(&self, range: &str, rows: Rows) -> Result<(), PortError>;
}

#[async_trait]
impl<T: TabularStore + ?Sized> TabularStore for std::sync::Arc<T> {
    fn service(&self) -> &str {
        (**self).service()
    }

    async fn read(&self, range: &str) -> Result<Rows, PortError> {
        (**self).read(range).await
    }

    async fn write(&self, range: &str, rows: Rows) -> Result<(), PortError> {
        (**self).write(range, rows).await
    }

    async fn append(&self, range: &str, rows: Rows) -> Result<(), PortError> {
        (**self).append(range, rows).await
    }
}

/// Text of a cell, trimmed; numbers are rendered without a trailing `.0`.
pub fn cell_text(cell: Option<&Cell>) -> String {
    match cell {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Numeric value of a cell, accepting numeric strings.
pub fn cell_number(cell: Option<&Cell>) -> Option<f64> {
    match cell {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if !s.trim().is_empty() => crate::records::parse_number(s),
        _ => None,
    }
}

/// True when a cell holds nothing.
pub fn cell_is_blank(cell: Option<&Cell>) -> bool {
    cell_text(cell).is_empty()
}
