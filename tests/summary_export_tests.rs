mod common;

use std::path::Path;

use common::browser::ScriptedBrowser;
use common::fixtures::{config_with, fixed_clock, profile};
use revaudit::engine::{AuditEngine, AuditPlan, AuditRun};
use revaudit::events::EventSink;
use revaudit::export::{export_summary, RunSummary};
use revaudit::signals::OperatorSignals;
use revaudit::workbook::{MemoryDocument, MemoryOpener};
use tempfile::TempDir;

fn audited_run() -> AuditRun {
    let opener = MemoryOpener::new();
    opener.insert(
        "kinnex.xlsx",
        MemoryDocument::new(50, 12)
            .with_link("A3", "WI-001 Intake", "https://portal.example/docs/1")
            .with_link("A4", "WI-002, Sequencing", "https://portal.example/docs/2")
            .with_link("G7", "WI-104 Shipping", "https://portal.example/docs/104"),
    );
    let browser = ScriptedBrowser::new()
        .with_title("https://portal.example/docs/2", "Application Error")
        .with_title("https://portal.example/docs/104", "404");

    let config = config_with(
        vec![profile("Kinnex", "kinnex.xlsx", &["A3:A23", "G7:G21"])],
        Path::new("out"),
    );
    let plan = AuditPlan::from_config(&config, &[]).unwrap();
    let signals = OperatorSignals::new();
    signals.request_start();

    AuditEngine::new(browser, opener, plan, signals, EventSink::disconnected())
        .with_clock(fixed_clock)
        .run()
}

#[test]
fn test_summary_counts() {
    let run = audited_run();
    let summary = RunSummary::from_run(&run);

    assert_eq!(summary.outcome, "Audit Complete! Reports Saved.");
    assert_eq!(summary.state, "Completed");
    assert_eq!(summary.total_links, 3);
    assert_eq!(summary.checked_links, 3);
    assert_eq!(summary.dead_links, 2);
    assert!(summary.finished_at.is_some());

    let kinnex = &summary.profiles[0];
    let dead_cells: Vec<&str> = kinnex.dead.iter().map(|d| d.cell.as_str()).collect();
    assert_eq!(dead_cells, vec!["A4", "G7"]);
    assert_eq!(kinnex.dead[0].url, "https://portal.example/docs/2");
    assert!(kinnex.report.is_some());
}

#[test]
fn test_json_summary() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested").join("summary.json");
    export_summary(&audited_run(), &path).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["dead_links"], 2);
    assert_eq!(json["profiles"][0]["name"], "Kinnex");
    assert_eq!(json["profiles"][0]["dead"][1]["display_text"], "WI-104 Shipping");
}

#[test]
fn test_csv_summary_has_one_row_per_dead_link() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("summary.csv");
    export_summary(&audited_run(), &path).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(&headers[0], "Profile");
    assert_eq!(&headers[2], "Cell");

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][2], "A4");
    // Commas in display text survive quoting.
    assert_eq!(&rows[0][3], "WI-002, Sequencing");
    assert_eq!(&rows[1][2], "G7");
}
