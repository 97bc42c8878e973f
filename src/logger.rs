use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::RwLock;

use crate::engine::{AuditOutcome, AuditRun};

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,   // Only progress bar and final summary
    Summary = 1,  // Status lines (default)
    Detailed = 2, // Per-link results, warnings
    Debug = 3,    // Everything
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }
}

/// Operator-facing console output for one audit.
#[derive(Clone)]
pub struct AuditLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
    metadata: Arc<Mutex<AuditMetadata>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<PathBuf>,
}

#[derive(Default, Clone)]
struct AuditMetadata {
    start_time: Option<Instant>,
    end_time: Option<Instant>,
    profiles: Vec<(String, usize, usize)>,
    links_total: usize,
    links_checked: usize,
    dead_links: usize,
    reports: Vec<PathBuf>,
    summary_file: Option<PathBuf>,
    outcome: Option<String>,
}

impl AuditLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(RwLock::new(None)),
            metadata: Arc::new(Mutex::new(AuditMetadata::default())),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: PathBuf) -> Self {
        Self {
            log_file_path: Some(log_file_path),
            ..Self::new(verbosity)
        }
    }

    fn metadata(&self) -> MutexGuard<'_, AuditMetadata> {
        self.metadata.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("WARN", message);
        }
    }

    pub fn error(&self, message: &str) {
        // Errors are never hidden by verbosity
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let msg = format!("[{}] {}: {}", Self::timestamp(), level, message);

        if self.log_file_path.is_some() {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(msg.clone());
            }
        }

        // Print through the progress bar so it keeps its line
        if let Ok(guard) = self.progress_bar.try_read() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }

        eprintln!("{}", msg);
    }

    fn timestamp() -> String {
        Local::now().format("%H:%M:%S%.3f").to_string()
    }

    pub async fn start_progress(&self, total_links: u64) {
        let pb = ProgressBar::new(total_links);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message("Checking links...");

        *self.progress_bar.write().await = Some(pb);
    }

    pub async fn has_progress(&self) -> bool {
        self.progress_bar.read().await.is_some()
    }

    pub async fn update_progress(&self, message: &str) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.set_message(message.to_string());
        }
    }

    pub async fn set_progress_position(&self, position: u64) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.set_position(position);
        }
    }

    pub async fn finish_progress(&self) {
        if let Some(pb) = self.progress_bar.write().await.take() {
            pb.finish_and_clear();
        }
    }

    pub fn mark_started(&self) {
        self.metadata().start_time = Some(Instant::now());
    }

    /// Copy the counters of a finished run into the summary.
    pub fn record_run(&self, run: &AuditRun) {
        let mut metadata = self.metadata();
        metadata.end_time = Some(Instant::now());
        metadata.profiles = run
            .profiles
            .iter()
            .map(|p| (p.profile.name().to_string(), p.links.len(), p.scan.dead.len()))
            .collect();
        metadata.links_total = run.total_links();
        metadata.links_checked = run.checked_links();
        metadata.dead_links = run.dead_links();
        metadata.reports = run.reports();
        metadata.outcome = run.outcome.as_ref().map(ToString::to_string);
    }

    pub fn record_outcome(&self, outcome: &AuditOutcome) {
        let mut metadata = self.metadata();
        metadata.end_time.get_or_insert_with(Instant::now);
        metadata.outcome = Some(outcome.to_string());
    }

    pub fn record_summary_file(&self, path: &Path) {
        self.metadata().summary_file = Some(path.to_path_buf());
    }

    pub fn log_status(&self, status: &str) {
        self.info(status);
    }

    pub fn log_validation_failed(&self, message: &str) {
        // Surfaced at every verbosity: the operator has to act on it
        self.print_message("WARN", message);
    }

    pub fn log_report_written(&self, path: &Path) {
        self.info(&format!("Report saved: {}", path.display()));
    }

    pub fn print_final_summary(&self) {
        let metadata = self.metadata().clone();

        print!("\x1b[2K\r");
        let _ = io::stdout().flush();

        println!("\n=== AUDIT SUMMARY ===");

        if let (Some(start), Some(end)) = (metadata.start_time, metadata.end_time) {
            println!("Audit Duration: {:.2}s", end.duration_since(start).as_secs_f64());
        }

        for (name, links, dead) in &metadata.profiles {
            println!("{}: {} links, {} dead", name, links, dead);
        }
        println!(
            "Links Checked: {}/{}",
            metadata.links_checked, metadata.links_total
        );
        println!("Dead Links: {}", metadata.dead_links);

        for report in &metadata.reports {
            println!("Report Written: {}", report.display());
        }
        if let Some(summary) = &metadata.summary_file {
            println!("Summary Exported: {}", summary.display());
        }

        println!("=====================\n");

        if let Some(outcome) = &metadata.outcome {
            println!("{}", outcome);
        }
    }

    /// Export all collected logs to the configured file
    pub fn export_logs(&self) -> anyhow::Result<()> {
        let Some(log_file_path) = &self.log_file_path else {
            return Ok(());
        };
        let buffer = self.log_buffer.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = log_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_file_path)?;

        for entry in buffer.iter() {
            writeln!(file, "{}", entry)?;
        }
        file.flush()?;
        Ok(())
    }

    pub fn is_log_export_enabled(&self) -> bool {
        self.log_file_path.is_some()
    }

    pub fn get_log_count(&self) -> usize {
        self.log_buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_count() {
        assert_eq!(VerbosityLevel::from_verbose_count(0), VerbosityLevel::Summary);
        assert_eq!(VerbosityLevel::from_verbose_count(1), VerbosityLevel::Detailed);
        assert_eq!(VerbosityLevel::from_verbose_count(5), VerbosityLevel::Debug);
    }

    #[test]
    fn test_buffer_only_when_exporting() {
        let logger = AuditLogger::new(VerbosityLevel::Debug);
        logger.info("hello");
        assert_eq!(logger.get_log_count(), 0);
        assert!(!logger.is_log_export_enabled());
    }

    #[test]
    fn test_export_logs_writes_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.log");
        let logger = AuditLogger::with_log_file(VerbosityLevel::Summary, path.clone());

        logger.info("Loading Excel Data...");
        logger.debug("hidden at this verbosity");
        logger.error("Browser error");
        assert_eq!(logger.get_log_count(), 2);

        logger.export_logs().unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("INFO: Loading Excel Data..."));
        assert!(content.contains("ERROR: Browser error"));
        assert!(!content.contains("hidden"));
    }

    #[tokio::test]
    async fn test_progress_lifecycle() {
        let logger = AuditLogger::new(VerbosityLevel::Silent);
        logger.start_progress(3).await;
        assert!(logger.has_progress().await);
        logger.set_progress_position(2).await;
        logger.finish_progress().await;
        assert!(!logger.has_progress().await);
    }
}
