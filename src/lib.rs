//! Spreadsheet hyperlink revision audit.
//!
//! Reads the hyperlinked cells of configured ranges, checks each link in a
//! single operator-authenticated browser session, and writes a report copy
//! of each source workbook with dead revisions highlighted.

pub mod address;
pub mod browser;
pub mod cli;
pub mod config;
pub mod engine;
pub mod events;
pub mod export;
pub mod links;
pub mod liveness;
pub mod logger;
pub mod report;
pub mod session;
pub mod signals;
pub mod workbook;

pub use address::{CellAddress, CellRange};
pub use engine::{AuditEngine, AuditOutcome, AuditPlan, AuditRun};
pub use links::LinkRecord;
