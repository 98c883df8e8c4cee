//! A1-notation ranges (`INVENTARIO!A5:M5`, `PROVEEDORES!A:AA`).

use std::fmt;

/// Column letters for a 0-based index: 0 → `A`, 25 → `Z`, 26 → `AA`.
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// 0-based index for column letters; `None` for anything that is not `[A-Z]+`.
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut n = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_uppercase() {
            return None;
        }
        n = n * 26 + (c as usize - 'A' as usize + 1);
    }
    Some(n - 1)
}

/// A rectangular sheet range. Rows are 1-based as in the sheet UI; `None`
/// rows mean the whole column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
    pub sheet: String,
    pub first_col: usize,
    pub first_row: Option<usize>,
    pub last_col: usize,
    pub last_row: Option<usize>,
}

impl A1Range {
    /// Whole columns `first..=last`.
    pub fn columns(sheet: impl Into<String>, first_col: usize, last_col: usize) -> Self {
        Self {
            sheet: sheet.into(),
            first_col,
            first_row: None,
            last_col,
            last_row: None,
        }
    }

    /// Columns `first..=last` of a single 1-based row.
    pub fn row(sheet: impl Into<String>, row: usize, first_col: usize, last_col: usize) -> Self {
        Self {
            sheet: sheet.into(),
            first_col,
            first_row: Some(row),
            last_col,
            last_row: Some(row),
        }
    }

    /// Parse `SHEET!A1:B2`, `SHEET!A:Z` or `SHEET!A5:M5`.
    pub fn parse(s: &str) -> Option<Self> {
        let (sheet, cells) = s.rsplit_once('!')?;
        let sheet = sheet.trim_matches('\'');
        let (start, end) = cells.split_once(':').unwrap_or((cells, cells));
        let (first_col, first_row) = split_cell(start)?;
        let (last_col, last_row) = split_cell(end)?;
        Some(Self {
            sheet: sheet.to_string(),
            first_col,
            first_row,
            last_col,
            last_row,
        })
    }

    /// Number of columns covered.
    pub fn width(&self) -> usize {
        self.last_col + 1 - self.first_col
    }
}

fn split_cell(cell: &str) -> Option<(usize, Option<usize>)> {
    let split = cell.find(|c: char| c.is_ascii_digit()).unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);
    let col = column_index(letters)?;
    let row = if digits.is_empty() {
        None
    } else {
        Some(digits.parse().ok().filter(|r: &usize| *r >= 1)?)
    };
    Some((col, row))
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let row = |r: Option<usize>| r.map(|r| r.to_string()).unwrap_or_default();
        write!(
            f,
            "{}!{}{}:{}{}",
            self.sheet,
            column_letter(self.first_col),
            row(self.first_row),
            column_letter(self.last_col),
            row(self.last_row)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_round_trip_at_boundaries() {
        for (i, s) in [(0, "A"), (12, "M"), (25, "Z"), (26, "AA"), (701, "ZZ"), (702, "AAA")] {
            assert_eq!(column_letter(i), s);
            assert_eq!(column_index(s), Some(i));
        }
        assert_eq!(column_index("a"), None);
        assert_eq!(column_index(""), None);
    }

    #[test]
    fn parse_full_width_and_row_ranges() {
        let r = A1Range::parse("INVENTARIO!A:Z").unwrap();
        assert_eq!((r.first_col, r.last_col, r.first_row), (0, 25, None));
        assert_eq!(r.width(), 26);

        let r = A1Range::parse("INVENTARIO!A5:M5").unwrap();
        assert_eq!(r.first_row, Some(5));
        assert_eq!(r.last_col, 12);
        assert_eq!(r.to_string(), "INVENTARIO!A5:M5");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(A1Range::parse("no sheet").is_none());
        assert!(A1Range::parse("S!1:2").is_none());
        assert!(A1Range::parse("S!A0:B0").is_none());
    }

    #[test]
    fn row_range_display() {
        assert_eq!(A1Range::row("INVENTARIO", 7, 0, 17).to_string(), "INVENTARIO!A7:R7");
    }
}
