//! Worker → console event stream.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::engine::AuditOutcome;

#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    /// Free-form status line for the operator.
    Status(String),
    /// Links classified so far across all profiles.
    Progress {
        processed: usize,
        total: usize,
        percent: u8,
    },
    /// The operator signalled start but the page still looks like a login
    /// screen. Recoverable.
    ValidationFailed(String),
    /// Terminal outcome of the run; always the last event.
    Finished(AuditOutcome),
}

/// Whole-number percentage that only reaches 100 when `processed == total`.
pub fn progress_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((processed.min(total) * 100) / total) as u8
}

/// Sending half of the event channel.
///
/// Sends never fail from the worker's point of view: once the console has
/// gone away events are dropped.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<AuditEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, UnboundedReceiver<AuditEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, event: AuditEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn status(&self, message: impl Into<String>) {
        self.send(AuditEvent::Status(message.into()));
    }

    pub fn progress(&self, processed: usize, total: usize) {
        self.send(AuditEvent::Progress {
            processed,
            total,
            percent: progress_percent(processed, total),
        });
    }

    pub fn validation_failed(&self, message: impl Into<String>) {
        self.send(AuditEvent::ValidationFailed(message.into()));
    }

    pub fn finished(&self, outcome: AuditOutcome) {
        self.send(AuditEvent::Finished(outcome));
    }
}

/// Drain everything currently queued on `rx` without blocking.
pub fn drain(rx: &mut UnboundedReceiver<AuditEvent>) -> Vec<AuditEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
