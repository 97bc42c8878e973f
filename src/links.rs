//! Link extraction: which cells of a revision sheet carry document links.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::address::{CellAddress, CellRange};
use crate::config::ProfileConfig;
use crate::workbook::{CellDocument, WorkbookError, WorkbookOpener};

/// One hyperlinked cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub cell: CellAddress,
    pub display_text: String,
    pub target_url: String,
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Profile '{0}' has no configured ranges")]
    Configuration(String),

    #[error("Invalid range '{range}' for profile '{profile}': {error}")]
    InvalidRange {
        profile: String,
        range: String,
        error: String,
    },

    #[error("Source workbook not found: {0}")]
    NotFound(PathBuf),

    #[error(transparent)]
    Workbook(#[from] WorkbookError),
}

/// Reads link cells for the configured profiles.
pub struct LinkExtractor<'a, O: WorkbookOpener> {
    opener: &'a O,
    profiles: &'a [ProfileConfig],
}

impl<'a, O: WorkbookOpener> LinkExtractor<'a, O> {
    pub fn new(opener: &'a O, profiles: &'a [ProfileConfig]) -> Self {
        Self { opener, profiles }
    }

    /// Hyperlinked cells of `source` within the ranges configured for
    /// `profile_name`, in range declaration order then row-major order.
    pub fn extract(&self, source: &Path, profile_name: &str) -> Result<Vec<LinkRecord>, ExtractError> {
        let ranges = self.ranges_for(profile_name)?;

        if !self.opener.exists(source) {
            return Err(ExtractError::NotFound(source.to_path_buf()));
        }

        let document = self.opener.open(source).map_err(|e| match e {
            WorkbookError::NotFound(path) => ExtractError::NotFound(path),
            other => ExtractError::Workbook(other),
        })?;

        let links = collect_links(&document, &ranges);
        info!(
            "Extracted {} links for {} from {}",
            links.len(),
            profile_name,
            source.display()
        );
        Ok(links)
    }

    fn ranges_for(&self, profile_name: &str) -> Result<Vec<CellRange>, ExtractError> {
        let profile = self
            .profiles
            .iter()
            .find(|p| p.name == profile_name)
            .filter(|p| !p.ranges.is_empty())
            .ok_or_else(|| ExtractError::Configuration(profile_name.to_string()))?;

        profile
            .ranges
            .iter()
            .map(|spec| {
                CellRange::parse(spec).map_err(|e| ExtractError::InvalidRange {
                    profile: profile_name.to_string(),
                    range: spec.clone(),
                    error: e.to_string(),
                })
            })
            .collect()
    }
}

/// Walk `ranges` in order and keep every cell with an external hyperlink.
/// A cell covered by more than one range is reported once.
pub fn collect_links<D: CellDocument>(document: &D, ranges: &[CellRange]) -> Vec<LinkRecord> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for range in ranges {
        for cell in range.cells() {
            let Some(target_url) = document.hyperlink(cell) else {
                continue;
            };
            if !seen.insert(cell) {
                debug!("{} appears in more than one range; keeping first", cell);
                continue;
            }
            links.push(LinkRecord {
                cell,
                display_text: document.display_text(cell),
                target_url,
            });
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::{MemoryDocument, MemoryOpener};

    fn profile(name: &str, ranges: &[&str]) -> ProfileConfig {
        ProfileConfig {
            name: name.to_string(),
            source: PathBuf::from(format!("{name}.xlsx")),
            ranges: ranges.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn sample_opener() -> MemoryOpener {
        let opener = MemoryOpener::new();
        opener.insert(
            "Kinnex.xlsx",
            MemoryDocument::new(100, 20)
                .with_link("G8", "Doc G8", "https://docs.example.com/g8")
                .with_link("A4", "Doc A4", "https://docs.example.com/a4")
                .with_value("A5", "no link here")
                .with_link("A3", "Doc A3", "https://docs.example.com/a3")
                .with_link("B3", "outside", "https://docs.example.com/b3"),
        );
        opener
    }

    #[test]
    fn test_extract_orders_by_range_then_row_major() {
        let opener = sample_opener();
        let profiles = vec![profile("Kinnex", &["A3:A23", "G7:G21"])];
        let extractor = LinkExtractor::new(&opener, &profiles);

        let links = extractor.extract(Path::new("Kinnex.xlsx"), "Kinnex").unwrap();
        let cells: Vec<String> = links.iter().map(|l| l.cell.to_string()).collect();
        assert_eq!(cells, vec!["A3", "A4", "G8"]);
        assert_eq!(links[0].display_text, "Doc A3");
        assert_eq!(links[0].target_url, "https://docs.example.com/a3");
    }

    #[test]
    fn test_unknown_profile_is_configuration_error() {
        let opener = sample_opener();
        let profiles = vec![profile("Kinnex", &["A3:A23"])];
        let extractor = LinkExtractor::new(&opener, &profiles);

        let err = extractor.extract(Path::new("Kinnex.xlsx"), "Quattro").unwrap_err();
        assert!(matches!(err, ExtractError::Configuration(_)));
    }

    #[test]
    fn test_profile_without_ranges_is_configuration_error() {
        let opener = sample_opener();
        let profiles = vec![profile("Kinnex", &[])];
        let extractor = LinkExtractor::new(&opener, &profiles);

        let err = extractor.extract(Path::new("Kinnex.xlsx"), "Kinnex").unwrap_err();
        assert!(matches!(err, ExtractError::Configuration(_)));
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let opener = sample_opener();
        let profiles = vec![profile("Kinnex", &["A3:A23"])];
        let extractor = LinkExtractor::new(&opener, &profiles);

        let err = extractor.extract(Path::new("missing.xlsx"), "Kinnex").unwrap_err();
        assert!(matches!(err, ExtractError::NotFound(_)));
    }

    #[test]
    fn test_ranges_without_links_yield_empty() {
        let opener = sample_opener();
        let profiles = vec![profile("Kinnex", &["D1:D50"])];
        let extractor = LinkExtractor::new(&opener, &profiles);

        let links = extractor.extract(Path::new("Kinnex.xlsx"), "Kinnex").unwrap();
        assert!(links.is_empty());
    }

    #[test]
    fn test_overlapping_ranges_report_cell_once() {
        let opener = sample_opener();
        let profiles = vec![profile("Kinnex", &["A3:A4", "A3"])];
        let extractor = LinkExtractor::new(&opener, &profiles);

        let links = extractor.extract(Path::new("Kinnex.xlsx"), "Kinnex").unwrap();
        assert_eq!(links.len(), 2);
    }
}
