//! In-memory [`TabularStore`] honouring A1 ranges.
//!
//! Behaves like the spreadsheet values API closely enough for reconciliation:
//! reads trim trailing blank cells and rows, writes wider than their range are
//! rejected, appends land after the last non-empty row. Every write and append
//! is logged so tests can assert exactly which cells were touched.

use super::range::A1Range;
use super::store::{cell_is_blank, Cell, Rows, TabularStore};
use crate::error::PortError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// One mutating call seen by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    Write { range: String, rows: Rows },
    Append { range: String, rows: Rows },
}

impl StoreWrite {
    pub fn range(&self) -> &str {
        match self {
            StoreWrite::Write { range, .. } | StoreWrite::Append { range, .. } => range,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    sheets: HashMap<String, Rows>,
    log: Vec<StoreWrite>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a sheet with rows, header first.
    pub fn with_sheet(self, name: impl Into<String>, rows: Rows) -> Self {
        self.lock().sheets.insert(name.into(), rows);
        self
    }

    /// Current contents of a sheet.
    pub fn sheet(&self, name: &str) -> Rows {
        self.lock().sheets.get(name).cloned().unwrap_or_default()
    }

    /// Every write and append so far, in order.
    pub fn writes(&self) -> Vec<StoreWrite> {
        self.lock().log.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parse_range(range: &str) -> Result<A1Range, PortError> {
    A1Range::parse(range)
        .ok_or_else(|| PortError::permanent("memory", format!("Unable to parse range: {range}")))
}

fn put(grid: &mut Rows, row: usize, col: usize, value: Cell) {
    if grid.len() <= row {
        grid.resize(row + 1, Vec::new());
    }
    let cells = &mut grid[row];
    if cells.len() <= col {
        cells.resize(col + 1, Value::String(String::new()));
    }
    cells[col] = value;
}

fn check_width(range: &A1Range, rows: &Rows) -> Result<(), PortError> {
    let width = range.width();
    if let Some(wide) = rows.iter().find(|r| r.len() > width) {
        return Err(PortError::permanent(
            "memory",
            format!(
                "Requested writing within range [{range}], but tried writing {} columns",
                wide.len()
            ),
        ));
    }
    Ok(())
}

#[async_trait]
impl TabularStore for MemoryStore {
    fn service(&self) -> &str {
        "memory"
    }

    async fn read(&self, range: &str) -> Result<Rows, PortError> {
        let r = parse_range(range)?;
        let state = self.lock();
        let grid = state
            .sheets
            .get(&r.sheet)
            .ok_or_else(|| PortError::permanent("memory", format!("Unable to parse range: {range}")))?;

        let first = r.first_row.map(|n| n - 1).unwrap_or(0);
        let last = r.last_row.unwrap_or(grid.len()).min(grid.len());
        let mut out: Rows = (first..last)
            .map(|i| {
                let row = &grid[i];
                let mut cells: Vec<Cell> = (r.first_col..=r.last_col)
                    .map(|c| row.get(c).cloned().unwrap_or(Value::String(String::new())))
                    .collect();
                while cells.last().map(|c| cell_is_blank(Some(c))).unwrap_or(false) {
                    cells.pop();
                }
                cells
            })
            .collect();
        while out.last().map(|r| r.is_empty()).unwrap_or(false) {
            out.pop();
        }
        Ok(out)
    }

    async fn write(&self, range: &str, rows: Rows) -> Result<(), PortError> {
        let r = parse_range(range)?;
        check_width(&r, &rows)?;
        let mut state = self.lock();
        let start = r.first_row.map(|n| n - 1).unwrap_or(0);
        let grid = state.sheets.entry(r.sheet.clone()).or_default();
        for (i, row) in rows.iter().enumerate() {
            for (j, cell) in row.iter().enumerate() {
                put(grid, start + i, r.first_col + j, cell.clone());
            }
        }
        state.log.push(StoreWrite::Write {
            range: range.to_string(),
            rows,
        });
        Ok(())
    }

    async fn append(&self, range: &str, rows: Rows) -> Result<(), PortError> {
        let r = parse_range(range)?;
        check_width(&r, &rows)?;
        let mut state = self.lock();
        let grid = state.sheets.entry(r.sheet.clone()).or_default();
        let used = grid
            .iter()
            .rposition(|row| row.iter().any(|c| !cell_is_blank(Some(c))))
            .map(|i| i + 1)
            .unwrap_or(0);
        for (i, row) in rows.iter().enumerate() {
            for (j, cell) in row.iter().enumerate() {
                put(grid, used + i, r.first_col + j, cell.clone());
            }
        }
        state.log.push(StoreWrite::Append {
            range: range.to_string(),
            rows,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new().with_sheet(
            "S",
            vec![
                vec![json!("CLAVE"), json!("CIUDAD"), json!("TARIFA")],
                vec![json!("ZM1"), json!("Puebla"), json!(100)],
            ],
        )
    }

    #[tokio::test]
    async fn read_trims_trailing_blanks() {
        let s = store();
        s.write("S!A4:C4", vec![vec![json!(""), json!(""), json!("")]])
            .await
            .unwrap();
        let rows = s.read("S!A:Z").await.unwrap();
        assert_eq!(rows.len(), 2);
        let cols = s.read("S!A:B").await.unwrap();
        assert_eq!(cols[1], vec![json!("ZM1"), json!("Puebla")]);
    }

    #[tokio::test]
    async fn write_rejects_rows_wider_than_range() {
        let s = store();
        let err = s
            .write("S!A2:B2", vec![vec![json!("a"), json!("b"), json!("c")]])
            .await
            .unwrap_err();
        assert!(err.message.contains("S!A2:B2"));
        assert_eq!(s.sheet("S")[1][2], json!(100));
    }

    #[tokio::test]
    async fn append_lands_after_last_used_row() {
        let s = store();
        s.append("S!A:B", vec![vec![json!("ZM2"), json!("León")]])
            .await
            .unwrap();
        let grid = s.sheet("S");
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[2][0], json!("ZM2"));
        assert_eq!(s.writes().len(), 1);
        assert_eq!(s.writes()[0].range(), "S!A:B");
    }

    #[tokio::test]
    async fn unknown_sheet_is_permanent_error() {
        let err = store().read("OTHER!A:Z").await.unwrap_err();
        assert_eq!(err.class, crate::error::ErrorClass::Permanent);
    }
}
