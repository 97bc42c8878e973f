//! A1-style cell addressing for worksheet cells and rectangular ranges.
//!
//! Rows and columns are 1-based, matching how addresses appear in the
//! spreadsheet UI and in OOXML `r="..."` attributes.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Last addressable row of an OOXML worksheet.
pub const MAX_ROW: u32 = 1_048_576;

/// Last addressable column (`XFD`) of an OOXML worksheet.
pub const MAX_COL: u32 = 16_384;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("cell reference is empty")]
    Empty,

    #[error("cell reference '{0}' is missing a column")]
    MissingColumn(String),

    #[error("cell reference '{0}' is missing a row")]
    MissingRow(String),

    #[error("cell reference '{0}' has trailing characters")]
    Trailing(String),

    #[error("cell reference '{0}' is outside the worksheet grid")]
    OutOfBounds(String),
}

/// A single worksheet cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    // Field order gives row-major `Ord`.
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parse an A1 reference such as `A3`, `$G$7` or `xfd10`.
    pub fn parse(a1: &str) -> Result<Self, AddressError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        let bytes = s.as_bytes();
        let mut idx = 0usize;
        if bytes.get(idx) == Some(&b'$') {
            idx += 1;
        }

        let mut col: u32 = 0;
        let col_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_alphabetic() {
            let digit = (bytes[idx].to_ascii_uppercase() - b'A') as u32 + 1;
            col = col
                .checked_mul(26)
                .and_then(|c| c.checked_add(digit))
                .ok_or_else(|| AddressError::OutOfBounds(s.to_string()))?;
            idx += 1;
        }
        if idx == col_start {
            return Err(AddressError::MissingColumn(s.to_string()));
        }

        if bytes.get(idx) == Some(&b'$') {
            idx += 1;
        }

        let row_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        if idx == row_start {
            return Err(AddressError::MissingRow(s.to_string()));
        }
        if idx != bytes.len() {
            return Err(AddressError::Trailing(s.to_string()));
        }

        let row: u32 = s[row_start..idx]
            .parse()
            .map_err(|_| AddressError::OutOfBounds(s.to_string()))?;

        if row == 0 || row > MAX_ROW || col > MAX_COL {
            return Err(AddressError::OutOfBounds(s.to_string()));
        }

        Ok(Self { row, col })
    }

    /// Column letters for this address (`1 -> A`, `27 -> AA`).
    pub fn column_name(&self) -> String {
        column_name(self.col)
    }

    /// Returns the address `columns` to the right, if it is still on the grid.
    pub fn offset_columns(&self, columns: u32) -> Option<Self> {
        let col = self.col.checked_add(columns)?;
        (col <= MAX_COL).then_some(Self { row: self.row, col })
    }

    pub fn is_on_grid(&self) -> bool {
        (1..=MAX_ROW).contains(&self.row) && (1..=MAX_COL).contains(&self.col)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_name(self.col), self.row)
    }
}

impl FromStr for CellAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn column_name(mut col: u32) -> String {
    let mut out = Vec::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        out.push(b'A' + rem);
        col = (col - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// The revision cell that belongs to a link cell.
///
/// Revision sheets keep the revision letter one column to the right of
/// the document link. This is a fixed layout convention, not something
/// discovered from the sheet. Returns `None` for links in the last column.
pub fn revision_cell_for(link: CellAddress) -> Option<CellAddress> {
    link.offset_columns(1)
}

/// A rectangular block of cells, e.g. `A3:A23`. A single cell (`G7`) is
/// a one-cell range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl CellRange {
    /// Build a range from two corners given in any order.
    pub fn new(a: CellAddress, b: CellAddress) -> Self {
        Self {
            start: CellAddress::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellAddress::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    pub fn parse(spec: &str) -> Result<Self, AddressError> {
        let s = spec.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        match s.split_once(':') {
            None => {
                let cell = CellAddress::parse(s)?;
                Ok(Self::new(cell, cell))
            }
            Some((a, b)) => Ok(Self::new(CellAddress::parse(a)?, CellAddress::parse(b)?)),
        }
    }

    pub fn contains(&self, cell: CellAddress) -> bool {
        (self.start.row..=self.end.row).contains(&cell.row)
            && (self.start.col..=self.end.col).contains(&cell.col)
    }

    pub fn cell_count(&self) -> usize {
        let rows = (self.end.row - self.start.row + 1) as usize;
        let cols = (self.end.col - self.start.col + 1) as usize;
        rows * cols
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = CellAddress> + '_ {
        let (start, end) = (self.start, self.end);
        (start.row..=end.row)
            .flat_map(move |row| (start.col..=end.col).map(move |col| CellAddress::new(row, col)))
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

impl FromStr for CellRange {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_round_trip() {
        for a1 in ["A1", "G7", "K34", "Z9", "AA1", "AZ100", "XFD1048576"] {
            let addr = CellAddress::parse(a1).unwrap();
            assert_eq!(addr.to_string(), a1);
        }
    }

    #[test]
    fn test_parse_accepts_absolute_markers_and_lowercase() {
        assert_eq!(CellAddress::parse("$G$7").unwrap(), CellAddress::new(7, 7));
        assert_eq!(CellAddress::parse("k34").unwrap(), CellAddress::new(34, 11));
    }

    #[test]
    fn test_parse_rejects_malformed_references() {
        assert_eq!(CellAddress::parse(""), Err(AddressError::Empty));
        assert!(matches!(CellAddress::parse("12"), Err(AddressError::MissingColumn(_))));
        assert!(matches!(CellAddress::parse("A"), Err(AddressError::MissingRow(_))));
        assert!(matches!(CellAddress::parse("A1B"), Err(AddressError::Trailing(_))));
        assert!(matches!(CellAddress::parse("A0"), Err(AddressError::OutOfBounds(_))));
        assert!(matches!(CellAddress::parse("XFE1"), Err(AddressError::OutOfBounds(_))));
    }

    #[test]
    fn test_revision_cell_is_one_column_right() {
        let link = CellAddress::parse("A3").unwrap();
        assert_eq!(revision_cell_for(link).unwrap().to_string(), "B3");

        let link = CellAddress::parse("G21").unwrap();
        assert_eq!(revision_cell_for(link).unwrap().to_string(), "H21");

        let link = CellAddress::parse("Z5").unwrap();
        assert_eq!(revision_cell_for(link).unwrap().to_string(), "AA5");
    }

    #[test]
    fn test_revision_cell_absent_at_last_column() {
        let link = CellAddress::parse("XFD2").unwrap();
        assert!(revision_cell_for(link).is_none());
    }

    #[test]
    fn test_range_cells_are_row_major() {
        let range = CellRange::parse("A1:B2").unwrap();
        let cells: Vec<String> = range.cells().map(|c| c.to_string()).collect();
        assert_eq!(cells, vec!["A1", "B1", "A2", "B2"]);
        assert_eq!(range.cell_count(), 4);
    }

    #[test]
    fn test_single_cell_range() {
        let range = CellRange::parse("G7").unwrap();
        assert_eq!(range.cells().count(), 1);
        assert_eq!(range.to_string(), "G7");
    }

    #[test]
    fn test_range_corners_are_normalized() {
        let range = CellRange::parse("G21:G7").unwrap();
        assert_eq!(range.to_string(), "G7:G21");
        assert!(range.contains(CellAddress::parse("G10").unwrap()));
        assert!(!range.contains(CellAddress::parse("H10").unwrap()));
    }
}
