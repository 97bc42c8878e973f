//! Machine-readable summary of an audit run.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use csv::Writer;
use serde::Serialize;
use tracing::{debug, info};

use crate::engine::{AuditRun, ProfileRun};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryFormat {
    Json,
    Csv,
}

impl SummaryFormat {
    /// Pick the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Ok(SummaryFormat::Json),
            Some("csv") => Ok(SummaryFormat::Csv),
            _ => bail!(
                "Unsupported summary format for {} (use .json or .csv)",
                path.display()
            ),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub outcome: String,
    pub state: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub total_links: usize,
    pub checked_links: usize,
    pub dead_links: usize,
    pub profiles: Vec<ProfileSummary>,
}

#[derive(Debug, Serialize)]
pub struct ProfileSummary {
    pub name: String,
    pub source: PathBuf,
    pub total_links: usize,
    pub checked_links: usize,
    pub report: Option<PathBuf>,
    pub dead: Vec<DeadLinkSummary>,
}

#[derive(Debug, Serialize)]
pub struct DeadLinkSummary {
    pub cell: String,
    pub display_text: String,
    pub url: String,
    pub reason: String,
}

impl RunSummary {
    pub fn from_run(run: &AuditRun) -> Self {
        Self {
            outcome: run
                .outcome
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            state: format!("{:?}", run.state()),
            started_at: run.started_at.to_rfc3339(),
            finished_at: run.finished_at.map(|t| t.to_rfc3339()),
            total_links: run.total_links(),
            checked_links: run.checked_links(),
            dead_links: run.dead_links(),
            profiles: run.profiles.iter().map(ProfileSummary::from_profile_run).collect(),
        }
    }
}

impl ProfileSummary {
    fn from_profile_run(profile_run: &ProfileRun) -> Self {
        // Walk the links so dead cells come out in extraction order
        let dead = profile_run
            .links
            .iter()
            .filter_map(|link| {
                profile_run.scan.dead.get(&link.cell).map(|reason| DeadLinkSummary {
                    cell: link.cell.to_string(),
                    display_text: link.display_text.clone(),
                    url: link.target_url.clone(),
                    reason: crate::liveness::LinkStatus::Dead(reason.clone()).to_string(),
                })
            })
            .collect();

        Self {
            name: profile_run.profile.name().to_string(),
            source: profile_run.profile.source().to_path_buf(),
            total_links: profile_run.links.len(),
            checked_links: profile_run.scan.checked_links,
            report: profile_run.report.clone(),
            dead,
        }
    }
}

/// Write the summary of `run` to `output_path`, JSON or CSV by extension.
pub fn export_summary(run: &AuditRun, output_path: &Path) -> Result<()> {
    let format = SummaryFormat::from_path(output_path)?;
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let summary = RunSummary::from_run(run);
    match format {
        SummaryFormat::Json => export_json(&summary, output_path),
        SummaryFormat::Csv => export_csv(&summary, output_path),
    }
}

pub fn export_json(summary: &RunSummary, output_path: &Path) -> Result<()> {
    debug!("Exporting audit summary to JSON: {}", output_path.display());

    let json_string = serde_json::to_string_pretty(summary)?;
    let mut file = File::create(output_path)?;
    file.write_all(json_string.as_bytes())?;

    info!(
        "Exported summary of {} profiles to {}",
        summary.profiles.len(),
        output_path.display()
    );
    Ok(())
}

/// One row per dead link.
pub fn export_csv(summary: &RunSummary, output_path: &Path) -> Result<()> {
    debug!("Exporting audit summary to CSV: {}", output_path.display());

    let file = File::create(output_path)?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record([
        "Profile",
        "Source",
        "Cell",
        "Display Text",
        "URL",
        "Reason",
        "Report",
        "Outcome",
    ])?;

    let mut rows = 0usize;
    for profile in &summary.profiles {
        let report = profile
            .report
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        for dead in &profile.dead {
            wtr.write_record([
                profile.name.as_str(),
                &profile.source.display().to_string(),
                &dead.cell,
                &dead.display_text,
                &dead.url,
                &dead.reason,
                &report,
                &summary.outcome,
            ])?;
            rows += 1;
        }
    }

    wtr.flush()?;
    info!("Exported {} dead links to CSV: {}", rows, output_path.display());
    Ok(())
}
