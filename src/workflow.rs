//! Workflow state engine: which step an operation is waiting on.
//!
//! The step is derived from the current paperwork and dive facts every time
//! it is asked for. It is never stored, so it cannot drift from the facts and
//! there is no such thing as an illegal transition.

use serde::Serialize;
use uuid::Uuid;

use crate::storage::Storage;

/// Existence and signature of one compliance document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DocumentState {
    pub exists: bool,
    pub signed: bool,
}

impl DocumentState {
    pub const MISSING: Self = Self {
        exists: false,
        signed: false,
    };

    /// A document only counts once it exists and is signed.
    pub fn is_signed(self) -> bool {
        self.exists && self.signed
    }
}

/// Everything the workflow and the compliance gate need to know about an
/// operation, as read from the document registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DocumentStatus {
    pub permit: DocumentState,
    pub annex: DocumentState,
    pub dive_count: u64,
    pub log_count: u64,
    pub has_team: bool,
}

/// The step an operation is currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    /// The operation itself has not been recorded.
    Operation,
    WorkPermit,
    SafetyAnnex,
    Dive,
    Log,
    Completed,
}

impl WorkflowStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Operation => "operation",
            Self::WorkPermit => "work_permit",
            Self::SafetyAnnex => "safety_annex",
            Self::Dive => "dive",
            Self::Log => "log",
            Self::Completed => "completed",
        }
    }

    /// What the user has to do next, for display.
    pub fn label(self) -> &'static str {
        match self {
            Self::Operation => "create the operation",
            Self::WorkPermit => "submit and sign the work permit",
            Self::SafetyAnnex => "submit and sign the safety annex",
            Self::Dive => "plan the first dive",
            Self::Log => "record the missing dive logs",
            Self::Completed => "nothing, all paperwork is complete",
        }
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the step from the document registry facts. First match wins.
pub fn workflow_step(status: &DocumentStatus) -> WorkflowStep {
    if !status.permit.is_signed() {
        WorkflowStep::WorkPermit
    } else if !status.annex.is_signed() {
        WorkflowStep::SafetyAnnex
    } else if status.dive_count == 0 {
        WorkflowStep::Dive
    } else if status.log_count < status.dive_count {
        WorkflowStep::Log
    } else {
        WorkflowStep::Completed
    }
}

/// Look up an operation's step.
///
/// An unknown or unreadable operation resolves to [`WorkflowStep::Operation`],
/// the most restrictive step.
pub fn operation_step(storage: &Storage, operation_id: Uuid) -> WorkflowStep {
    match storage.document_status(operation_id) {
        Ok(status) => workflow_step(&status),
        Err(e) => {
            tracing::debug!(%operation_id, error = %e, "no document status, workflow at operation step");
            WorkflowStep::Operation
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::storage::test_support::test_storage;

    const SIGNED: DocumentState = DocumentState {
        exists: true,
        signed: true,
    };
    const UNSIGNED: DocumentState = DocumentState {
        exists: true,
        signed: false,
    };

    fn status(permit: DocumentState, annex: DocumentState, dives: u64, logs: u64) -> DocumentStatus {
        DocumentStatus {
            permit,
            annex,
            dive_count: dives,
            log_count: logs,
            has_team: true,
        }
    }

    #[test]
    fn missing_or_unsigned_permit_comes_first() {
        for permit in [DocumentState::MISSING, UNSIGNED] {
            for annex in [DocumentState::MISSING, UNSIGNED, SIGNED] {
                let s = status(permit, annex, 3, 1);
                assert_eq!(workflow_step(&s), WorkflowStep::WorkPermit);
            }
        }
    }

    #[test]
    fn annex_after_permit() {
        assert_eq!(
            workflow_step(&status(SIGNED, DocumentState::MISSING, 0, 0)),
            WorkflowStep::SafetyAnnex
        );
        assert_eq!(
            workflow_step(&status(SIGNED, UNSIGNED, 2, 2)),
            WorkflowStep::SafetyAnnex
        );
    }

    #[test]
    fn dive_then_log_then_completed() {
        assert_eq!(workflow_step(&status(SIGNED, SIGNED, 0, 0)), WorkflowStep::Dive);
        assert_eq!(workflow_step(&status(SIGNED, SIGNED, 3, 2)), WorkflowStep::Log);
        assert_eq!(
            workflow_step(&status(SIGNED, SIGNED, 3, 3)),
            WorkflowStep::Completed
        );
    }

    #[test]
    fn signed_flag_without_existence_does_not_count() {
        let ghost = DocumentState {
            exists: false,
            signed: true,
        };
        assert_eq!(
            workflow_step(&status(ghost, SIGNED, 1, 1)),
            WorkflowStep::WorkPermit
        );
    }

    #[test]
    fn step_is_a_pure_function_of_its_inputs() {
        let inputs = [
            status(SIGNED, SIGNED, 4, 1),
            status(UNSIGNED, SIGNED, 0, 0),
            status(SIGNED, DocumentState::MISSING, 1, 0),
        ];
        for s in inputs {
            let first = workflow_step(&s);
            for _ in 0..10 {
                assert_eq!(workflow_step(&s), first);
            }
            // The team assignment is not a workflow input.
            let without_team = DocumentStatus {
                has_team: false,
                ..s
            };
            assert_eq!(workflow_step(&without_team), first);
        }
    }

    #[test]
    fn unknown_operation_is_at_operation_step() {
        let (_dir, storage) = test_storage();
        assert_eq!(
            operation_step(&storage, Uuid::new_v4()),
            WorkflowStep::Operation
        );
    }
}
