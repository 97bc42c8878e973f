//! Session gate: one browser launch, then wait until the operator has
//! logged in before any link is checked.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::browser::{BrowserLauncher, PageDriver};
use crate::events::EventSink;
use crate::signals::{OperatorSignals, Signal};

/// Title/URL fragments that mean the browser is still on a login screen.
pub const LOGIN_MARKERS: [&str; 2] = ["login", "sign in"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingStart,
    Validating,
    Ready,
    Aborted,
}

pub enum GateOutcome<P> {
    Ready(P),
    Aborted,
}

impl<P> GateOutcome<P> {
    pub fn is_ready(&self) -> bool {
        matches!(self, GateOutcome::Ready(_))
    }
}

pub fn is_login_page(title: &str, url: &str) -> bool {
    let title = title.to_lowercase();
    let url = url.to_lowercase();
    LOGIN_MARKERS
        .iter()
        .any(|m| title.contains(m) || url.contains(m))
}

pub struct SessionGate<'a, L: BrowserLauncher> {
    launcher: &'a L,
    signals: &'a OperatorSignals,
    events: &'a EventSink,
    state: SessionState,
    history: Vec<SessionState>,
}

impl<'a, L: BrowserLauncher> SessionGate<'a, L> {
    pub fn new(launcher: &'a L, signals: &'a OperatorSignals, events: &'a EventSink) -> Self {
        Self {
            launcher,
            signals,
            events,
            state: SessionState::AwaitingStart,
            history: vec![SessionState::AwaitingStart],
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state entered, in order.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session gate: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Launch the browser, open `initial_url` so the operator lands on the
    /// login screen, then block until an authenticated page is confirmed or
    /// the operator aborts. Launch failures are errors; navigation failures
    /// are not.
    pub fn open_and_authenticate(&mut self, initial_url: &str) -> Result<GateOutcome<L::Page>> {
        if self.signals.is_abort_requested() {
            self.transition(SessionState::Aborted);
            return Ok(GateOutcome::Aborted);
        }

        self.events.status("Launching Browser...");
        let mut page = self.launcher.launch()?;

        if let Err(e) = page.navigate(initial_url) {
            warn!("Initial navigation to {} failed: {:#}", initial_url, e);
        }

        self.events
            .status("WAITING: Log in to the document portal, then press Enter to start.");

        loop {
            match self.signals.wait_for_start_or_abort() {
                Signal::Abort => {
                    drop(page);
                    self.transition(SessionState::Aborted);
                    info!("Session gate aborted by operator");
                    return Ok(GateOutcome::Aborted);
                }
                Signal::Start => {
                    self.transition(SessionState::Validating);

                    let authenticated = match page.title() {
                        Ok(title) => {
                            let url = page.url().unwrap_or_default();
                            !is_login_page(&title, &url)
                        }
                        Err(e) => {
                            debug!("Could not read page title: {:#}", e);
                            false
                        }
                    };

                    if authenticated {
                        self.transition(SessionState::Ready);
                        info!("Browser session authenticated");
                        return Ok(GateOutcome::Ready(page));
                    }

                    // Consume the start before telling the operator, so a
                    // quick retry is not lost.
                    self.signals.clear_start();
                    self.transition(SessionState::AwaitingStart);
                    self.events.validation_failed(
                        "The browser is still on a login page. Log in, then press Enter again.",
                    );
                }
            }
        }
    }
}
