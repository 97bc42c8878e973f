//! Revision report generation.
//!
//! A report is a copy of the source workbook with every audited link
//! neutralised (hyperlink removed, font recolored), the revision cell of
//! each dead link blanked and highlighted, and the audit time stamped.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::address::{revision_cell_for, CellAddress};
use crate::config::{ConfigError, ReportConfig};
use crate::links::LinkRecord;
use crate::workbook::{CellDocument, WorkbookError, WorkbookOpener};

const DEFAULT_DATE_FORMAT: &str = "%m/%d/%Y";
const DEFAULT_TIME_FORMAT: &str = "%I:%M %p";

/// Formatting applied to reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSettings {
    pub neutral_font_color: String,
    pub highlight_color: String,
    pub date_cell: CellAddress,
    pub time_cell: CellAddress,
    pub date_format: String,
    pub time_format: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            neutral_font_color: "FF000000".to_string(),
            highlight_color: "FFFFFF00".to_string(),
            date_cell: CellAddress::new(34, 11),
            time_cell: CellAddress::new(35, 11),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            time_format: DEFAULT_TIME_FORMAT.to_string(),
        }
    }
}

impl ReportSettings {
    pub fn from_config(config: &ReportConfig) -> Result<Self, ConfigError> {
        let cell = |field: &str, value: &str| {
            CellAddress::parse(value).map_err(|e| ConfigError::InvalidRange {
                field: field.to_string(),
                range: value.to_string(),
                error: e.to_string(),
            })
        };
        Ok(Self {
            neutral_font_color: config.neutral_font_color.to_ascii_uppercase(),
            highlight_color: config.highlight_color.to_ascii_uppercase(),
            date_cell: cell("report.date_cell", &config.date_cell)?,
            time_cell: cell("report.time_cell", &config.time_cell)?,
            date_format: config.date_format.clone(),
            time_format: config.time_format.clone(),
        })
    }
}

/// Render `at` with a strftime pattern, falling back when the pattern is
/// not renderable.
fn format_stamp(at: &NaiveDateTime, pattern: &str, fallback: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", at.format(pattern)).is_ok() {
        return out;
    }
    warn!("Invalid timestamp format '{}', using '{}'", pattern, fallback);
    at.format(fallback).to_string()
}

pub struct ReportWriter<'a, O: WorkbookOpener> {
    opener: &'a O,
    settings: ReportSettings,
}

impl<'a, O: WorkbookOpener> ReportWriter<'a, O> {
    pub fn new(opener: &'a O, settings: ReportSettings) -> Self {
        Self { opener, settings }
    }

    /// Write the report for one profile to `output`.
    ///
    /// Returns `Ok(None)` without touching anything when `source` is gone.
    pub fn write_report(
        &self,
        source: &Path,
        output: &Path,
        links: &[LinkRecord],
        dead: &BTreeSet<CellAddress>,
        stamped_at: NaiveDateTime,
    ) -> Result<Option<PathBuf>, WorkbookError> {
        if !self.opener.exists(source) {
            warn!("Source {} disappeared; skipping report", source.display());
            return Ok(None);
        }
        let mut document = self.opener.open(source)?;

        for link in links {
            document.remove_hyperlink(link.cell);
            document.set_font_color(link.cell, &self.settings.neutral_font_color);
        }

        for cell in dead {
            match revision_cell_for(*cell) {
                Some(revision) if document.is_addressable(revision) => {
                    document.clear_value(revision);
                    document.set_fill_color(revision, &self.settings.highlight_color);
                }
                _ => debug!("Dead link {} has no revision cell", cell),
            }
        }

        let date = format_stamp(&stamped_at, &self.settings.date_format, DEFAULT_DATE_FORMAT);
        let time = format_stamp(&stamped_at, &self.settings.time_format, DEFAULT_TIME_FORMAT);
        for (cell, value) in [(self.settings.date_cell, date), (self.settings.time_cell, time)] {
            if document.is_addressable(cell) {
                document.set_value(cell, &value);
            } else {
                debug!("Stamp cell {} is not addressable; skipped", cell);
            }
        }

        document.save(output)?;
        info!(
            "Report saved to {} ({} links, {} dead)",
            output.display(),
            links.len(),
            dead.len()
        );
        Ok(Some(output.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::{MemoryDocument, MemoryOpener};
    use chrono::NaiveDate;

    fn link(cell: &str, url: &str) -> LinkRecord {
        LinkRecord {
            cell: CellAddress::parse(cell).unwrap(),
            display_text: cell.to_string(),
            target_url: url.to_string(),
        }
    }

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 4)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap()
    }

    fn source() -> MemoryDocument {
        MemoryDocument::new(50, 12)
            .with_link("A3", "WI-1", "https://docs/1")
            .with_value("B3", "C")
            .with_link("A4", "WI-2", "https://docs/2")
            .with_value("B4", "D")
    }

    #[test]
    fn test_report_marks_dead_revisions_only() {
        let opener = MemoryOpener::new();
        opener.insert("src.xlsx", source());
        let writer = ReportWriter::new(&opener, ReportSettings::default());

        let links = vec![link("A3", "https://docs/1"), link("A4", "https://docs/2")];
        let dead: BTreeSet<_> = [CellAddress::parse("A4").unwrap()].into_iter().collect();

        let out = writer
            .write_report(Path::new("src.xlsx"), Path::new("out.xlsx"), &links, &dead, stamp())
            .unwrap();
        assert_eq!(out, Some(PathBuf::from("out.xlsx")));

        let report = opener.get(Path::new("out.xlsx")).unwrap();
        for cell in ["A3", "A4"] {
            let c = report.cell(cell).unwrap();
            assert_eq!(c.hyperlink, None);
            assert_eq!(c.font_color.as_deref(), Some("FF000000"));
        }
        assert_eq!(report.cell("B3").unwrap().value, "C");
        assert_eq!(report.cell("B3").unwrap().fill_color, None);
        assert_eq!(report.cell("B4").unwrap().value, "");
        assert_eq!(report.cell("B4").unwrap().fill_color.as_deref(), Some("FFFFFF00"));

        assert_eq!(report.cell("K34").unwrap().value, "03/04/2025");
        assert_eq!(report.cell("K35").unwrap().value, "02:05 PM");
    }

    #[test]
    fn test_missing_source_is_noop() {
        let opener = MemoryOpener::new();
        let writer = ReportWriter::new(&opener, ReportSettings::default());
        let out = writer
            .write_report(Path::new("gone.xlsx"), Path::new("out.xlsx"), &[], &BTreeSet::new(), stamp())
            .unwrap();
        assert_eq!(out, None);
        assert!(opener.paths().is_empty());
    }

    #[test]
    fn test_stamp_skipped_when_not_addressable() {
        let opener = MemoryOpener::new();
        opener.insert("small.xlsx", MemoryDocument::new(10, 3).with_link("A1", "x", "https://x"));
        let writer = ReportWriter::new(&opener, ReportSettings::default());

        let links = vec![link("A1", "https://x")];
        writer
            .write_report(Path::new("small.xlsx"), Path::new("out.xlsx"), &links, &BTreeSet::new(), stamp())
            .unwrap();

        let report = opener.get(Path::new("out.xlsx")).unwrap();
        assert!(report.cell("K34").is_none());
        assert!(report.cell("K35").is_none());
    }

    #[test]
    fn test_report_with_no_dead_links_still_neutralises() {
        let opener = MemoryOpener::new();
        opener.insert("src.xlsx", source());
        let writer = ReportWriter::new(&opener, ReportSettings::default());

        let links = vec![link("A3", "https://docs/1")];
        writer
            .write_report(Path::new("src.xlsx"), Path::new("out.xlsx"), &links, &BTreeSet::new(), stamp())
            .unwrap();

        let report = opener.get(Path::new("out.xlsx")).unwrap();
        assert_eq!(report.cell("A3").unwrap().hyperlink, None);
        // Not part of the audited set.
        assert_eq!(report.cell("A4").unwrap().hyperlink.as_deref(), Some("https://docs/2"));
        assert_eq!(report.cell("B4").unwrap().value, "D");
    }

    #[test]
    fn test_invalid_format_falls_back() {
        assert_eq!(format_stamp(&stamp(), "%Q", DEFAULT_DATE_FORMAT), "03/04/2025");
    }
}
