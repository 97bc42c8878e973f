use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use revaudit::address::CellAddress;
use revaudit::config::{AppConfig, ProfileConfig, DEFAULT_CONFIG};
use rust_xlsxwriter::Workbook;

/// Builder for a single-sheet source workbook written with rust_xlsxwriter.
#[derive(Default)]
pub struct SourceSheet {
    links: Vec<(String, String, String)>,
    values: Vec<(String, String)>,
}

impl SourceSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(mut self, cell: &str, text: &str, url: &str) -> Self {
        self.links.push((cell.to_string(), text.to_string(), url.to_string()));
        self
    }

    pub fn value(mut self, cell: &str, text: &str) -> Self {
        self.values.push((cell.to_string(), text.to_string()));
        self
    }

    pub fn save(&self, path: &Path) {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Revisions").unwrap();

        for (cell, text) in &self.values {
            let (row, col) = zero_based(cell);
            worksheet.write_string(row, col, text.as_str()).unwrap();
        }
        for (cell, text, url) in &self.links {
            let (row, col) = zero_based(cell);
            worksheet
                .write_url_with_text(row, col, url.as_str(), text.as_str())
                .unwrap();
        }

        workbook.save(path).unwrap();
    }
}

fn zero_based(cell: &str) -> (u32, u16) {
    let addr = CellAddress::parse(cell).unwrap();
    (addr.row - 1, (addr.col - 1) as u16)
}

pub fn profile(name: &str, source: impl Into<PathBuf>, ranges: &[&str]) -> ProfileConfig {
    ProfileConfig {
        name: name.to_string(),
        source: source.into(),
        ranges: ranges.iter().map(|r| r.to_string()).collect(),
    }
}

/// Default config with its profiles replaced and reports routed to `output_dir`.
pub fn config_with(profiles: Vec<ProfileConfig>, output_dir: &Path) -> AppConfig {
    let mut config = AppConfig::from_toml(DEFAULT_CONFIG).unwrap();
    config.profiles = profiles;
    config.audit.output_dir = output_dir.to_path_buf();
    config
}

/// 2025-03-04 14:05, the timestamp used for report stamps in tests.
pub fn fixed_clock() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 4)
        .unwrap()
        .and_hms_opt(14, 5, 0)
        .unwrap()
}

/// The Kinnex revision sheet: three links, each with its revision letter
/// in the next column.
pub fn kinnex_sheet() -> SourceSheet {
    SourceSheet::new()
        .value("A1", "Kinnex Work Instructions")
        .link("A3", "WI-001 Intake", "https://portal.example/docs/1")
        .value("B3", "C")
        .link("A4", "WI-002 Sequencing", "https://portal.example/docs/2")
        .value("B4", "D")
        .link("G7", "WI-104 Shipping", "https://portal.example/docs/104")
        .value("H7", "B")
}
