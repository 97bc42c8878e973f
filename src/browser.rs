//! Browser session access.
//!
//! The audit drives exactly one page through a real browser so that the
//! operator's login cookies apply to every link. [`BrowserLauncher`] and
//! [`PageDriver`] are the seams the engine depends on; [`ChromeLauncher`]
//! is the headless_chrome implementation.
//!
//! Uses only blocking calls, so it is meant to run on a worker thread
//! (spawn_blocking), never on the async console.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{debug, info};

use crate::config::AppConfig;

/// A single navigable page. Calls are sequential by construction.
pub trait PageDriver {
    /// Navigate and wait for the page's load milestone.
    fn navigate(&mut self, url: &str) -> Result<()>;

    fn title(&self) -> Result<String>;

    fn url(&self) -> Result<String>;
}

/// Starts a browser and hands back its page. Dropping the page closes the
/// browser.
pub trait BrowserLauncher: Send + Sync {
    type Page: PageDriver;

    fn launch(&self) -> Result<Self::Page>;
}

#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    headless: bool,
    start_maximized: bool,
    navigation_timeout: Duration,
    chrome_path: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new(headless: bool, navigation_timeout: Duration) -> Self {
        Self {
            headless,
            start_maximized: true,
            navigation_timeout,
            chrome_path: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            headless: config.browser.headless,
            start_maximized: config.browser.start_maximized,
            navigation_timeout: Duration::from_secs(config.browser.navigation_timeout_secs),
            chrome_path: config.chrome_path(),
        }
    }

    pub fn with_chrome_path(mut self, path: Option<PathBuf>) -> Self {
        self.chrome_path = path;
        self
    }

    /// Containers need Chrome's sandbox disabled
    /// (detected via /.dockerenv or REVAUDIT_CONTAINER env var).
    fn is_container() -> bool {
        std::env::var("REVAUDIT_CONTAINER").is_ok() || std::path::Path::new("/.dockerenv").exists()
    }
}

impl BrowserLauncher for ChromeLauncher {
    type Page = ChromePage;

    fn launch(&self) -> Result<ChromePage> {
        let mut args: Vec<&OsStr> = Vec::new();
        if self.start_maximized && !self.headless {
            args.push(OsStr::new("--start-maximized"));
        }

        let options = headless_chrome::LaunchOptions::default_builder()
            .headless(self.headless)
            .sandbox(!Self::is_container())
            .window_size(None)
            .path(self.chrome_path.clone())
            .args(args)
            // The operator may take a while to log in; keep the browser alive.
            .idle_browser_timeout(Duration::from_secs(60 * 60))
            .build()
            .map_err(|e| anyhow!("Failed to build Chrome launch options: {}", e))?;

        let browser = headless_chrome::Browser::new(options)
            .map_err(|e| anyhow!("Failed to launch Chrome: {}", e))?;
        let tab = browser
            .new_tab()
            .map_err(|e| anyhow!("Failed to open browser tab: {}", e))?;
        tab.set_default_timeout(self.navigation_timeout);

        info!(
            "Launched Chrome ({})",
            if self.headless { "headless" } else { "visible" }
        );

        Ok(ChromePage {
            tab,
            _browser: browser,
        })
    }
}

/// The audit's single Chrome tab. The Chrome process is killed when this is
/// dropped.
pub struct ChromePage {
    tab: Arc<headless_chrome::Tab>,
    _browser: headless_chrome::Browser,
}

impl PageDriver for ChromePage {
    fn navigate(&mut self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| anyhow!("Navigation to {} failed: {}", url, e))?
            .wait_until_navigated()
            .map_err(|e| anyhow!("Page {} did not finish loading: {}", url, e))?;
        Ok(())
    }

    fn title(&self) -> Result<String> {
        self.tab
            .get_title()
            .map_err(|e| anyhow!("Failed to read page title: {}", e))
    }

    fn url(&self) -> Result<String> {
        Ok(self.tab.get_url())
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        debug!("Closing browser");
    }
}
