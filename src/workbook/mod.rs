//! Cell-addressable spreadsheet documents.
//!
//! The audit only needs a narrow view of a workbook: read hyperlinks and
//! display values, rewrite a handful of cells, save a copy. [`CellDocument`]
//! is that view; [`WorkbookOpener`] produces documents from paths.

mod memory;
mod patch;
mod xlsx;

pub use memory::{MemoryDocument, MemoryOpener};
pub use xlsx::{XlsxDocument, XlsxOpener};

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::address::CellAddress;

#[derive(Error, Debug)]
pub enum WorkbookError {
    #[error("Workbook not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to access workbook: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid workbook package: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Malformed workbook XML: {0}")]
    Xml(String),

    #[error("Workbook is missing part '{0}'")]
    MissingPart(String),

    #[error("Workbook has no worksheets")]
    NoWorksheet,
}

impl From<quick_xml::Error> for WorkbookError {
    fn from(e: quick_xml::Error) -> Self {
        WorkbookError::Xml(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for WorkbookError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        WorkbookError::Xml(e.to_string())
    }
}

impl From<quick_xml::escape::EscapeError> for WorkbookError {
    fn from(e: quick_xml::escape::EscapeError) -> Self {
        WorkbookError::Xml(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for WorkbookError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        WorkbookError::Xml(e.to_string())
    }
}

/// Read/write access to the cells of one worksheet.
pub trait CellDocument {
    /// External hyperlink target of a cell, if it has one.
    fn hyperlink(&self, cell: CellAddress) -> Option<String>;

    /// Rendered value of a cell; empty for blank cells.
    fn display_text(&self, cell: CellAddress) -> String;

    /// Whether the document can hold a value at `cell`.
    fn is_addressable(&self, cell: CellAddress) -> bool;

    fn set_value(&mut self, cell: CellAddress, value: &str);

    fn clear_value(&mut self, cell: CellAddress);

    fn remove_hyperlink(&mut self, cell: CellAddress);

    /// Set the font color as an ARGB hex string (e.g. `FF000000`).
    fn set_font_color(&mut self, cell: CellAddress, argb: &str);

    /// Apply a solid fill as an ARGB hex string (e.g. `FFFFFF00`).
    fn set_fill_color(&mut self, cell: CellAddress, argb: &str);

    fn save(&self, path: &Path) -> Result<(), WorkbookError>;
}

/// Opens documents from paths.
pub trait WorkbookOpener: Send + Sync {
    type Document: CellDocument;

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn open(&self, path: &Path) -> Result<Self::Document, WorkbookError>;
}
