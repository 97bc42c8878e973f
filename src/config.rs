//! Configuration management for revaudit
//!
//! All configuration is loaded from `./config/revaudit.toml` unless a path
//! is given on the command line. Defaults live in the config template, not
//! in source code.

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::address::{CellAddress, CellRange};

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/revaudit.toml";

/// Default configuration file content - this is the ONLY place defaults exist
pub const DEFAULT_CONFIG: &str = include_str!("../config/revaudit.toml");

/// Placeholder substituted with the profile name in report file names
pub const PROFILE_PLACEHOLDER: &str = "{profile}";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Invalid cell range in '{field}': {range} ({error})")]
    InvalidRange {
        field: String,
        range: String,
        error: String,
    },

    #[error("Invalid color in '{field}': {value} (expected 8 hex digits, ARGB)")]
    InvalidColor { field: String, value: String },

    #[error("Invalid timestamp format in '{field}': {value}")]
    InvalidFormat { field: String, value: String },

    #[error("Duplicate profile name '{0}'")]
    DuplicateProfile(String),

    #[error("Unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("'audit.report_file_name' must contain {{profile}}: {0}")]
    MissingPlaceholder(String),

    #[error("At least one profile must be configured")]
    NoProfiles,
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub audit: AuditConfig,
    pub browser: BrowserConfig,
    pub report: ReportConfig,
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
    /// Directory relative `source` paths resolve against. Set on load.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Where reports go and how they are named
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    pub output_dir: PathBuf,
    /// File name template; `{profile}` is replaced with the profile name
    pub report_file_name: String,
}

/// Browser session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    /// The operator logs in by hand, so the default is a visible window
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_start_maximized")]
    pub start_maximized: bool,
    pub navigation_timeout_secs: u64,
    /// Explicit Chrome/Chromium binary; `CHROME_PATH` takes precedence
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
}

fn default_start_maximized() -> bool {
    true
}

/// Report formatting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    pub neutral_font_color: String,
    pub highlight_color: String,
    pub date_cell: String,
    pub time_cell: String,
    pub date_format: String,
    pub time_format: String,
}

/// One customer profile: a source workbook and the ranges holding links
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProfileConfig {
    pub name: String,
    pub source: PathBuf,
    pub ranges: Vec<String>,
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audit.report_file_name.trim().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "audit.report_file_name".to_string(),
            });
        }
        if !self.audit.report_file_name.contains(PROFILE_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder(
                self.audit.report_file_name.clone(),
            ));
        }

        if self.browser.navigation_timeout_secs == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "browser.navigation_timeout_secs".to_string(),
            });
        }

        validate_color("report.neutral_font_color", &self.report.neutral_font_color)?;
        validate_color("report.highlight_color", &self.report.highlight_color)?;
        validate_cell("report.date_cell", &self.report.date_cell)?;
        validate_cell("report.time_cell", &self.report.time_cell)?;
        validate_format("report.date_format", &self.report.date_format)?;
        validate_format("report.time_format", &self.report.time_format)?;

        if self.profiles.is_empty() {
            return Err(ConfigError::NoProfiles);
        }

        let mut seen = HashSet::new();
        for (i, profile) in self.profiles.iter().enumerate() {
            if profile.name.trim().is_empty() {
                return Err(ConfigError::EmptyRequired {
                    field: format!("profiles[{}].name", i),
                });
            }
            if !seen.insert(profile.name.as_str()) {
                return Err(ConfigError::DuplicateProfile(profile.name.clone()));
            }
            if profile.source.as_os_str().is_empty() {
                return Err(ConfigError::EmptyRequired {
                    field: format!("profiles[{}].source", i),
                });
            }
            if profile.ranges.is_empty() {
                return Err(ConfigError::EmptyRequired {
                    field: format!("profiles[{}].ranges", i),
                });
            }
            for range in &profile.ranges {
                CellRange::parse(range).map_err(|e| ConfigError::InvalidRange {
                    field: format!("profiles[{}].ranges", i),
                    range: range.clone(),
                    error: e.to_string(),
                })?;
            }
        }

        Ok(())
    }

    pub fn profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Profiles to audit, in declaration order. An empty selection means all.
    pub fn select_profiles(&self, names: &[String]) -> Result<Vec<ProfileConfig>, ConfigError> {
        if names.is_empty() {
            return Ok(self.profiles.clone());
        }
        for name in names {
            if self.profile(name).is_none() {
                return Err(ConfigError::UnknownProfile(name.clone()));
            }
        }
        Ok(self
            .profiles
            .iter()
            .filter(|p| names.contains(&p.name))
            .cloned()
            .collect())
    }

    /// Source workbook path, resolved against the config file's directory
    pub fn source_path(&self, profile: &ProfileConfig) -> PathBuf {
        let source = expand_home(&profile.source);
        if source.is_absolute() {
            source
        } else {
            self.base_dir.join(source)
        }
    }

    /// Report output path for a profile
    pub fn report_path(&self, profile_name: &str) -> PathBuf {
        let file_name = self
            .audit
            .report_file_name
            .replace(PROFILE_PLACEHOLDER, profile_name);
        expand_home(&self.audit.output_dir).join(file_name)
    }

    /// Chrome binary to launch: `CHROME_PATH` first, then the config value
    pub fn chrome_path(&self) -> Option<PathBuf> {
        std::env::var_os("CHROME_PATH")
            .map(PathBuf::from)
            .or_else(|| self.browser.chrome_path.clone())
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        Self::create_default_config_at(Path::new(CONFIG_PATH))
    }

    /// Create default configuration file at a specific location
    pub fn create_default_config_at(path: &Path) -> Result<PathBuf, ConfigError> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        io::stdin().is_terminal()
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config_at(path)?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

fn validate_color(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.len() == 8 && value.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(ConfigError::InvalidColor {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

fn validate_format(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::EmptyRequired {
            field: field.to_string(),
        });
    }
    if StrftimeItems::new(value).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::InvalidFormat {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

fn validate_cell(field: &str, value: &str) -> Result<(), ConfigError> {
    CellAddress::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidRange {
            field: field.to_string(),
            range: value.to_string(),
            error: e.to_string(),
        })
}
