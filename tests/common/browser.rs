//! Scripted stand-in for the Chrome session.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use revaudit::browser::{BrowserLauncher, PageDriver};

pub const LOGIN_TITLE: &str = "Laserfiche Login";
pub const LIVE_TITLE: &str = "Document Viewer";

type VisitHook = Box<dyn Fn(usize) + Send>;

#[derive(Default)]
struct BrowserState {
    titles: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    logged_in: AtomicBool,
    fail_launch: AtomicBool,
    launches: AtomicUsize,
    closes: AtomicUsize,
    visits: Mutex<Vec<String>>,
    on_visit: Mutex<Option<VisitHook>>,
}

/// Every page shows [`LOGIN_TITLE`] until the session is logged in; after
/// that a URL shows its scripted title or [`LIVE_TITLE`].
#[derive(Clone, Default)]
pub struct ScriptedBrowser {
    state: Arc<BrowserState>,
}

impl ScriptedBrowser {
    /// A browser whose session is already authenticated.
    pub fn new() -> Self {
        let browser = Self::default();
        browser.set_logged_in(true);
        browser
    }

    pub fn logged_out() -> Self {
        Self::default()
    }

    pub fn with_title(self, url: &str, title: &str) -> Self {
        self.state
            .titles
            .lock()
            .unwrap()
            .insert(url.to_string(), title.to_string());
        self
    }

    pub fn with_failure(self, url: &str) -> Self {
        self.state.failing.lock().unwrap().insert(url.to_string());
        self
    }

    pub fn failing_launch(self) -> Self {
        self.state.fail_launch.store(true, Ordering::SeqCst);
        self
    }

    /// Run `hook` with the 1-based visit count after each navigation starts.
    pub fn on_visit(self, hook: impl Fn(usize) + Send + 'static) -> Self {
        *self.state.on_visit.lock().unwrap() = Some(Box::new(hook));
        self
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.state.logged_in.store(logged_in, Ordering::SeqCst);
    }

    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    /// Pages dropped so far. Each launched page closes exactly once.
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn visits(&self) -> Vec<String> {
        self.state.visits.lock().unwrap().clone()
    }
}

impl BrowserLauncher for ScriptedBrowser {
    type Page = ScriptedPage;

    fn launch(&self) -> Result<ScriptedPage> {
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_launch.load(Ordering::SeqCst) {
            return Err(anyhow!("Failed to launch Chrome: no browser binary"));
        }
        Ok(ScriptedPage {
            state: Arc::clone(&self.state),
            current: "about:blank".to_string(),
        })
    }
}

pub struct ScriptedPage {
    state: Arc<BrowserState>,
    current: String,
}

impl PageDriver for ScriptedPage {
    fn navigate(&mut self, url: &str) -> Result<()> {
        let count = {
            let mut visits = self.state.visits.lock().unwrap();
            visits.push(url.to_string());
            visits.len()
        };
        if let Some(hook) = self.state.on_visit.lock().unwrap().as_ref() {
            hook(count);
        }

        if self.state.failing.lock().unwrap().contains(url) {
            return Err(anyhow!("Navigation to {} failed: net::ERR_NAME_NOT_RESOLVED", url));
        }
        self.current = url.to_string();
        Ok(())
    }

    fn title(&self) -> Result<String> {
        if !self.state.logged_in.load(Ordering::SeqCst) {
            return Ok(LOGIN_TITLE.to_string());
        }
        Ok(self
            .state
            .titles
            .lock()
            .unwrap()
            .get(&self.current)
            .cloned()
            .unwrap_or_else(|| LIVE_TITLE.to_string()))
    }

    fn url(&self) -> Result<String> {
        Ok(self.current.clone())
    }
}

impl Drop for ScriptedPage {
    fn drop(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}
