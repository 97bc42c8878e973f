//! Audit engine: extraction, session gate, scan and reporting for one run.
//!
//! The engine is synchronous and meant to run on a blocking worker thread.
//! It talks to the console only through [`OperatorSignals`] (inbound) and
//! [`EventSink`] (outbound).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use thiserror::Error;
use tracing::{info, warn};

use crate::address::CellAddress;
use crate::browser::{BrowserLauncher, PageDriver};
use crate::config::{AppConfig, ConfigError, ProfileConfig};
use crate::events::EventSink;
use crate::links::{ExtractError, LinkExtractor, LinkRecord};
use crate::liveness::{self, DeadReason, LinkStatus};
use crate::report::{ReportSettings, ReportWriter};
use crate::session::{GateOutcome, SessionGate};
use crate::signals::OperatorSignals;
use crate::workbook::WorkbookOpener;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Init,
    Extracting,
    AwaitingSession,
    Scanning,
    Reporting,
    Completed,
    Aborted,
    Failed,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Completed | EngineState::Aborted | EngineState::Failed)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("No data found in source files")]
    NoData,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to read links for {profile}: {message}")]
    Extraction { profile: String, message: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Report generation failed: {}", .0.join("; "))]
    Report(Vec<String>),

    #[error("Audit worker stopped unexpectedly: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuditOutcome {
    Completed { reports: Vec<PathBuf> },
    Aborted,
    Failed(AuditError),
}

impl AuditOutcome {
    /// Process exit code for the console.
    pub fn exit_code(&self) -> i32 {
        match self {
            AuditOutcome::Completed { .. } => 0,
            AuditOutcome::Aborted => 2,
            AuditOutcome::Failed(_) => 1,
        }
    }

    pub fn state(&self) -> EngineState {
        match self {
            AuditOutcome::Completed { .. } => EngineState::Completed,
            AuditOutcome::Aborted => EngineState::Aborted,
            AuditOutcome::Failed(_) => EngineState::Failed,
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Completed { .. } => write!(f, "Audit Complete! Reports Saved."),
            AuditOutcome::Aborted => write!(f, "User Aborted Audit."),
            AuditOutcome::Failed(e) => write!(f, "Audit failed: {}", e),
        }
    }
}

/// A profile with its source and report paths resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditProfile {
    pub config: ProfileConfig,
    pub output: PathBuf,
}

impl AuditProfile {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn source(&self) -> &Path {
        &self.config.source
    }
}

/// Everything the engine needs to know about what to audit.
#[derive(Debug, Clone)]
pub struct AuditPlan {
    pub profiles: Vec<AuditProfile>,
    pub report: ReportSettings,
}

impl AuditPlan {
    /// Plan for the named profiles (all when `selected` is empty).
    pub fn from_config(config: &AppConfig, selected: &[String]) -> Result<Self, ConfigError> {
        let profiles = config
            .select_profiles(selected)?
            .into_iter()
            .map(|profile| {
                let source = config.source_path(&profile);
                let output = config.report_path(&profile.name);
                AuditProfile {
                    config: ProfileConfig { source, ..profile },
                    output,
                }
            })
            .collect();
        Ok(Self {
            profiles,
            report: ReportSettings::from_config(&config.report)?,
        })
    }
}

/// Scan progress for one profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub profile: String,
    pub total_links: usize,
    /// Links actually classified; lower than `total_links` after an abort.
    pub checked_links: usize,
    pub dead: BTreeMap<CellAddress, DeadReason>,
}

impl ScanResult {
    pub fn dead_cells(&self) -> BTreeSet<CellAddress> {
        self.dead.keys().copied().collect()
    }
}

#[derive(Debug, Clone)]
pub struct ProfileRun {
    pub profile: AuditProfile,
    pub links: Vec<LinkRecord>,
    pub scan: ScanResult,
    pub report: Option<PathBuf>,
}

/// One audit invocation.
#[derive(Debug, Clone)]
pub struct AuditRun {
    pub profiles: Vec<ProfileRun>,
    pub history: Vec<EngineState>,
    pub outcome: Option<AuditOutcome>,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
}

impl AuditRun {
    fn new() -> Self {
        Self {
            profiles: Vec::new(),
            history: vec![EngineState::Init],
            outcome: None,
            started_at: Local::now(),
            finished_at: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.history.last().copied().unwrap_or(EngineState::Init)
    }

    fn transition(&mut self, next: EngineState) {
        info!("Audit state: {:?} -> {:?}", self.state(), next);
        self.history.push(next);
    }

    pub fn total_links(&self) -> usize {
        self.profiles.iter().map(|p| p.links.len()).sum()
    }

    pub fn checked_links(&self) -> usize {
        self.profiles.iter().map(|p| p.scan.checked_links).sum()
    }

    pub fn dead_links(&self) -> usize {
        self.profiles.iter().map(|p| p.scan.dead.len()).sum()
    }

    pub fn reports(&self) -> Vec<PathBuf> {
        self.profiles.iter().filter_map(|p| p.report.clone()).collect()
    }
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub struct AuditEngine<L: BrowserLauncher, O: WorkbookOpener> {
    launcher: L,
    opener: O,
    plan: AuditPlan,
    signals: OperatorSignals,
    events: EventSink,
    clock: Clock,
}

impl<L: BrowserLauncher, O: WorkbookOpener> AuditEngine<L, O> {
    pub fn new(
        launcher: L,
        opener: O,
        plan: AuditPlan,
        signals: OperatorSignals,
        events: EventSink,
    ) -> Self {
        Self {
            launcher,
            opener,
            plan,
            signals,
            events,
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    /// Replace the clock used for report timestamps.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Run the whole audit. The terminal outcome is stored on the returned
    /// run and sent as the final event.
    pub fn run(&self) -> AuditRun {
        let mut run = AuditRun::new();

        let outcome = match self.execute(&mut run) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Audit failed: {}", e);
                AuditOutcome::Failed(e)
            }
        };

        run.transition(outcome.state());
        run.finished_at = Some(Local::now());
        run.outcome = Some(outcome.clone());
        self.events.status(outcome.to_string());
        self.events.finished(outcome);
        run
    }

    fn execute(&self, run: &mut AuditRun) -> Result<AuditOutcome, AuditError> {
        run.transition(EngineState::Extracting);
        self.events.status("Loading Excel Data...");
        self.extract_all(run)?;

        if self.signals.is_abort_requested() {
            return Ok(AuditOutcome::Aborted);
        }

        let total = run.total_links();
        let Some(first_url) = run
            .profiles
            .iter()
            .find_map(|p| p.links.first())
            .map(|l| l.target_url.clone())
        else {
            return Err(AuditError::NoData);
        };

        run.transition(EngineState::AwaitingSession);
        let mut gate = SessionGate::new(&self.launcher, &self.signals, &self.events);
        let page = match gate
            .open_and_authenticate(&first_url)
            .map_err(|e| AuditError::Browser(format!("{:#}", e)))?
        {
            GateOutcome::Ready(page) => page,
            GateOutcome::Aborted => return Ok(AuditOutcome::Aborted),
        };

        run.transition(EngineState::Scanning);
        self.events.status("Audit Started...");
        if self.scan(run, page, total) || self.signals.is_abort_requested() {
            return Ok(AuditOutcome::Aborted);
        }

        run.transition(EngineState::Reporting);
        self.events.status("Generating Reports...");
        let reports = self.write_reports(run)?;
        Ok(AuditOutcome::Completed { reports })
    }

    fn extract_all(&self, run: &mut AuditRun) -> Result<(), AuditError> {
        let configs: Vec<ProfileConfig> = self.plan.profiles.iter().map(|p| p.config.clone()).collect();
        let extractor = LinkExtractor::new(&self.opener, &configs);

        for profile in &self.plan.profiles {
            let links = match extractor.extract(profile.source(), profile.name()) {
                Ok(links) => links,
                Err(ExtractError::NotFound(path)) => {
                    warn!("Source for {} not found at {}; skipping", profile.name(), path.display());
                    Vec::new()
                }
                Err(e @ (ExtractError::Configuration(_) | ExtractError::InvalidRange { .. })) => {
                    return Err(AuditError::Configuration(e.to_string()));
                }
                Err(ExtractError::Workbook(e)) => {
                    return Err(AuditError::Extraction {
                        profile: profile.name().to_string(),
                        message: e.to_string(),
                    });
                }
            };

            run.profiles.push(ProfileRun {
                profile: profile.clone(),
                scan: ScanResult {
                    profile: profile.name().to_string(),
                    total_links: links.len(),
                    ..ScanResult::default()
                },
                links,
                report: None,
            });
        }
        Ok(())
    }

    /// Classify every link in order. Returns `true` if the operator aborted.
    /// The page (and with it the browser) is dropped on return.
    fn scan<P: PageDriver>(&self, run: &mut AuditRun, mut page: P, total: usize) -> bool {
        let mut processed = 0usize;
        self.events.progress(processed, total);

        for profile_run in run.profiles.iter_mut() {
            let ProfileRun { profile, links, scan, .. } = profile_run;
            if links.is_empty() {
                continue;
            }
            info!("Scanning {} ({} links)", profile.name(), links.len());

            for link in links.iter() {
                if self.signals.is_abort_requested() {
                    info!("Abort requested after {} of {} links", processed, total);
                    return true;
                }

                self.events
                    .status(format!("Checking {}: {}", profile.name(), link.display_text));
                let status = liveness::classify(&mut page, &link.target_url);
                scan.checked_links += 1;
                if status.is_dead() {
                    warn!("Dead link at {} ({}): {}", link.cell, link.target_url, status);
                }
                if let LinkStatus::Dead(reason) = status {
                    scan.dead.insert(link.cell, reason);
                }

                processed += 1;
                self.events.progress(processed, total);
            }
        }
        false
    }

    /// Attempt every eligible report; failures are collected, not short-circuited.
    fn write_reports(&self, run: &mut AuditRun) -> Result<Vec<PathBuf>, AuditError> {
        let writer = ReportWriter::new(&self.opener, self.plan.report.clone());
        let stamped_at = (self.clock)();

        let mut reports = Vec::new();
        let mut errors = Vec::new();
        for profile_run in run.profiles.iter_mut() {
            if profile_run.links.is_empty() {
                continue;
            }
            let profile = &profile_run.profile;
            match writer.write_report(
                profile.source(),
                &profile.output,
                &profile_run.links,
                &profile_run.scan.dead_cells(),
                stamped_at,
            ) {
                Ok(Some(path)) => {
                    reports.push(path.clone());
                    profile_run.report = Some(path);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Report for {} failed: {}", profile.name(), e);
                    errors.push(format!("{}: {}", profile.name(), e));
                }
            }
        }

        if errors.is_empty() {
            Ok(reports)
        } else {
            Err(AuditError::Report(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_exit_codes() {
        assert_eq!(AuditOutcome::Completed { reports: vec![] }.exit_code(), 0);
        assert_eq!(AuditOutcome::Aborted.exit_code(), 2);
        assert_eq!(AuditOutcome::Failed(AuditError::NoData).exit_code(), 1);
    }

    #[test]
    fn test_outcome_messages() {
        assert_eq!(AuditOutcome::Aborted.to_string(), "User Aborted Audit.");
        assert_eq!(
            AuditOutcome::Completed { reports: vec![] }.to_string(),
            "Audit Complete! Reports Saved."
        );
        assert_eq!(
            AuditOutcome::Failed(AuditError::NoData).to_string(),
            "Audit failed: No data found in source files"
        );
    }

    #[test]
    fn test_report_error_lists_every_profile() {
        let e = AuditError::Report(vec!["Kinnex: disk full".into(), "Quattro: disk full".into()]);
        assert_eq!(
            e.to_string(),
            "Report generation failed: Kinnex: disk full; Quattro: disk full"
        );
    }

    #[test]
    fn test_plan_resolves_paths() {
        let mut config: AppConfig = toml::from_str(crate::config::DEFAULT_CONFIG).unwrap();
        config.base_dir = PathBuf::from("/data");
        config.audit.output_dir = PathBuf::from("/reports");

        let plan = AuditPlan::from_config(&config, &["Quattro".to_string()]).unwrap();
        assert_eq!(plan.profiles.len(), 1);
        assert_eq!(plan.profiles[0].source(), Path::new("/data/Quattro Revision Source.xlsx"));
        assert_eq!(plan.profiles[0].output, PathBuf::from("/reports/Quattro Revisions.xlsx"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(EngineState::Completed.is_terminal());
        assert!(EngineState::Aborted.is_terminal());
        assert!(EngineState::Failed.is_terminal());
        assert!(!EngineState::Scanning.is_terminal());
    }
}
