use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{CellDocument, WorkbookError, WorkbookOpener};
use crate::address::CellAddress;

type Store = Arc<Mutex<HashMap<PathBuf, MemoryDocument>>>;

/// Contents and formatting of one in-memory cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryCell {
    pub value: String,
    pub hyperlink: Option<String>,
    pub font_color: Option<String>,
    pub fill_color: Option<String>,
}

/// A worksheet held entirely in memory.
///
/// The sheet is bounded by `max_row` x `max_col`; cells outside are not
/// addressable. Saving writes into the [`MemoryOpener`] the document was
/// opened from.
#[derive(Clone, Default)]
pub struct MemoryDocument {
    cells: BTreeMap<CellAddress, MemoryCell>,
    max_row: u32,
    max_col: u32,
    store: Option<Store>,
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDocument")
            .field("cells", &self.cells)
            .field("max_row", &self.max_row)
            .field("max_col", &self.max_col)
            .finish()
    }
}

impl PartialEq for MemoryDocument {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells && self.max_row == other.max_row && self.max_col == other.max_col
    }
}

impl MemoryDocument {
    pub fn new(max_row: u32, max_col: u32) -> Self {
        Self {
            cells: BTreeMap::new(),
            max_row,
            max_col,
            store: None,
        }
    }

    pub fn with_value(mut self, cell: &str, value: &str) -> Self {
        if let Ok(addr) = CellAddress::parse(cell) {
            self.cells.entry(addr).or_default().value = value.to_string();
        }
        self
    }

    pub fn with_link(mut self, cell: &str, text: &str, url: &str) -> Self {
        if let Ok(addr) = CellAddress::parse(cell) {
            let entry = self.cells.entry(addr).or_default();
            entry.value = text.to_string();
            entry.hyperlink = Some(url.to_string());
        }
        self
    }

    pub fn cell(&self, cell: &str) -> Option<&MemoryCell> {
        CellAddress::parse(cell).ok().and_then(|addr| self.cells.get(&addr))
    }

    pub fn cells(&self) -> impl Iterator<Item = (&CellAddress, &MemoryCell)> {
        self.cells.iter()
    }

    fn cell_mut(&mut self, cell: CellAddress) -> Option<&mut MemoryCell> {
        if !self.is_addressable(cell) {
            return None;
        }
        Some(self.cells.entry(cell).or_default())
    }
}

impl CellDocument for MemoryDocument {
    fn hyperlink(&self, cell: CellAddress) -> Option<String> {
        self.cells.get(&cell).and_then(|c| c.hyperlink.clone())
    }

    fn display_text(&self, cell: CellAddress) -> String {
        self.cells.get(&cell).map(|c| c.value.clone()).unwrap_or_default()
    }

    fn is_addressable(&self, cell: CellAddress) -> bool {
        cell.row >= 1 && cell.col >= 1 && cell.row <= self.max_row && cell.col <= self.max_col
    }

    fn set_value(&mut self, cell: CellAddress, value: &str) {
        if let Some(c) = self.cell_mut(cell) {
            c.value = value.to_string();
        }
    }

    fn clear_value(&mut self, cell: CellAddress) {
        if let Some(c) = self.cell_mut(cell) {
            c.value.clear();
        }
    }

    fn remove_hyperlink(&mut self, cell: CellAddress) {
        if let Some(c) = self.cells.get_mut(&cell) {
            c.hyperlink = None;
        }
    }

    fn set_font_color(&mut self, cell: CellAddress, argb: &str) {
        if let Some(c) = self.cell_mut(cell) {
            c.font_color = Some(argb.to_string());
        }
    }

    fn set_fill_color(&mut self, cell: CellAddress, argb: &str) {
        if let Some(c) = self.cell_mut(cell) {
            c.fill_color = Some(argb.to_string());
        }
    }

    fn save(&self, path: &Path) -> Result<(), WorkbookError> {
        let store = self.store.as_ref().ok_or_else(|| {
            WorkbookError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "document is not attached to a store",
            ))
        })?;
        let mut saved = self.clone();
        saved.store = None;
        store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_path_buf(), saved);
        Ok(())
    }
}

/// Opens [`MemoryDocument`]s registered by path; saved documents land in
/// the same store.
#[derive(Clone, Default)]
pub struct MemoryOpener {
    store: Store,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, document: MemoryDocument) {
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into(), document);
    }

    pub fn get(&self, path: &Path) -> Option<MemoryDocument> {
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

impl WorkbookOpener for MemoryOpener {
    type Document = MemoryDocument;

    fn exists(&self, path: &Path) -> bool {
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(path)
    }

    fn open(&self, path: &Path) -> Result<MemoryDocument, WorkbookError> {
        let mut document = self
            .get(path)
            .ok_or_else(|| WorkbookError::NotFound(path.to_path_buf()))?;
        document.store = Some(Arc::clone(&self.store));
        Ok(document)
    }
}
