//! Core data model for diveops.
//!
//! These types are the facts the compliance gate and the safety rule engine
//! reason about: operations and their documents, dives and their depth
//! history, alert rules, and the alerts those rules raise.

mod alert;
mod dive;
mod operation;
mod rule;

pub use alert::{AlertDetails, SafetyAlert};
pub use dive::{DepthSample, Dive, DiveLog, DiveState};
pub use operation::{Document, DocumentKind, Operation, OperationStatus};
pub use rule::{DEFAULT_MAX_ASCENT_RATE_M_PER_MIN, Priority, RuleKind, SafetyAlertRule};
