use std::path::PathBuf;

use clap::Parser;

use crate::config::{AppConfig, CONFIG_PATH};

#[derive(Parser, Debug)]
#[command(name = "revaudit")]
#[command(about = "Audits hyperlinked revision references in spreadsheets and writes highlighted revision reports")]
#[command(version)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = CONFIG_PATH)]
    pub config: PathBuf,

    /// Create the default configuration file at --config and exit
    #[arg(long)]
    pub init: bool,

    /// Only audit these profiles (repeatable; default: all configured profiles)
    #[arg(short, long = "profile", value_name = "NAME")]
    pub profiles: Vec<String>,

    /// Directory reports are written to (overrides audit.output_dir)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Run the browser without a window (overrides browser.headless)
    #[arg(long)]
    pub headless: bool,

    /// Verbose logging (use -v for warnings and per-link detail, -vv for DEBUG tracing)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Export execution logs to a file (specify file path)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Write a run summary; .json or .csv chooses the format
    #[arg(long, value_name = "PATH")]
    pub summary: Option<PathBuf>,
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        if self.profiles.iter().any(|p| p.trim().is_empty()) {
            return Err("Profile names cannot be empty".to_string());
        }

        if let Some(summary) = &self.summary {
            crate::export::SummaryFormat::from_path(summary).map_err(|e| e.to_string())?;
        }

        if let Some(dir) = &self.output_dir {
            if dir.as_os_str().is_empty() {
                return Err("Output directory cannot be empty".to_string());
            }
        }

        Ok(())
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.output_dir {
            config.audit.output_dir = dir.clone();
        }
        if self.headless {
            config.browser.headless = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["revaudit"]);
        assert_eq!(cli.config, PathBuf::from(CONFIG_PATH));
        assert!(cli.profiles.is_empty());
        assert!(!cli.init);
        assert_eq!(cli.verbose, 0);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_repeatable_profiles_and_verbosity() {
        let cli = Cli::parse_from([
            "revaudit", "--profile", "Kinnex", "-p", "Quattro", "-vv", "--headless",
        ]);
        assert_eq!(cli.profiles, vec!["Kinnex", "Quattro"]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.headless);
    }

    #[test]
    fn test_summary_extension_is_checked() {
        let cli = Cli::parse_from(["revaudit", "--summary", "run.txt"]);
        assert!(cli.validate().is_err());
        let cli = Cli::parse_from(["revaudit", "--summary", "run.json"]);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let mut config: AppConfig = toml::from_str(crate::config::DEFAULT_CONFIG).unwrap();
        let cli = Cli::parse_from(["revaudit", "--output-dir", "/tmp/reports", "--headless"]);
        cli.apply_overrides(&mut config);
        assert_eq!(config.audit.output_dir, PathBuf::from("/tmp/reports"));
        assert!(config.browser.headless);
    }
}
