//! Compliance gate: may a planned dive be executed under an operation?
//!
//! The gate needs a signed work permit, a signed safety annex and an
//! assigned dive team. Like the workflow step it is derived on demand from
//! the document registry and never stored. Mutations of its inputs go
//! through this module so the new gate value is recomputed and logged at the
//! moment it may change.

use std::fmt;

use jiff::Timestamp;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    model::{Document, DocumentKind},
    storage::{self, Storage},
    workflow::{DocumentStatus, WorkflowStep, workflow_step},
};

/// One condition the gate checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    SignedWorkPermit,
    SignedSafetyAnnex,
    AssignedTeam,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SignedWorkPermit => "signed work permit",
            Self::SignedSafetyAnnex => "signed safety annex",
            Self::AssignedTeam => "assigned dive team",
        })
    }
}

/// The requirements `status` does not meet, in check order.
pub fn unmet_requirements(status: &DocumentStatus) -> Vec<Requirement> {
    let mut unmet = Vec::new();
    if !status.permit.is_signed() {
        unmet.push(Requirement::SignedWorkPermit);
    }
    if !status.annex.is_signed() {
        unmet.push(Requirement::SignedSafetyAnnex);
    }
    if !status.has_team {
        unmet.push(Requirement::AssignedTeam);
    }
    unmet
}

/// `permit signed AND annex signed AND team assigned`.
pub fn can_execute(status: &DocumentStatus) -> bool {
    status.permit.is_signed() && status.annex.is_signed() && status.has_team
}

/// The gate for a stored operation. Unknown or unreadable operations are
/// never executable.
pub fn can_execute_operation(storage: &Storage, operation_id: Uuid) -> bool {
    match storage.document_status(operation_id) {
        Ok(status) => can_execute(&status),
        Err(e) => {
            tracing::warn!(%operation_id, error = %e, "compliance gate closed: status unavailable");
            false
        }
    }
}

/// A point-in-time view of an operation's paperwork.
#[derive(Debug, Clone, Serialize)]
pub struct Compliance {
    pub operation_id: Uuid,
    pub status: DocumentStatus,
    pub step: WorkflowStep,
    pub executable: bool,
    pub unmet: Vec<Requirement>,
}

impl Compliance {
    pub fn from_status(operation_id: Uuid, status: DocumentStatus) -> Self {
        Self {
            operation_id,
            step: workflow_step(&status),
            executable: can_execute(&status),
            unmet: unmet_requirements(&status),
            status,
        }
    }
}

/// Reads the operation's current compliance.
pub fn evaluate(storage: &Storage, operation_id: Uuid) -> storage::Result<Compliance> {
    let status = storage.document_status(operation_id)?;
    Ok(Compliance::from_status(operation_id, status))
}

/// Signs a document and re-validates the gate.
pub fn sign_document(
    storage: &Storage,
    operation_id: Uuid,
    kind: DocumentKind,
    signed_by: &str,
    signed_at: Timestamp,
) -> storage::Result<(Document, Compliance)> {
    let before = can_execute_operation(storage, operation_id);
    let document = storage.sign_document(operation_id, kind, signed_by, signed_at)?;
    let compliance = evaluate(storage, operation_id)?;
    log_gate_change(operation_id, before, &compliance, "document signed");
    Ok((document, compliance))
}

/// Assigns (or unassigns) the operation's team and re-validates the gate.
pub fn assign_team(
    storage: &Storage,
    operation_id: Uuid,
    team_id: Option<Uuid>,
) -> storage::Result<Compliance> {
    let before = can_execute_operation(storage, operation_id);
    storage.assign_team(operation_id, team_id)?;
    let compliance = evaluate(storage, operation_id)?;
    log_gate_change(operation_id, before, &compliance, "team assignment changed");
    Ok(compliance)
}

fn log_gate_change(operation_id: Uuid, before: bool, after: &Compliance, cause: &str) {
    if before == after.executable {
        tracing::debug!(%operation_id, executable = after.executable, cause, "compliance gate unchanged");
    } else if after.executable {
        tracing::info!(%operation_id, cause, "compliance gate opened");
    } else {
        tracing::info!(%operation_id, cause, unmet = ?after.unmet, "compliance gate closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        storage::{
            operation::tests::{sample_operation, unsigned_document},
            test_support::test_storage,
        },
        workflow::DocumentState,
    };

    fn doc(signed: bool) -> DocumentState {
        DocumentState {
            exists: true,
            signed,
        }
    }

    #[test]
    fn gate_is_the_conjunction_of_its_three_inputs() {
        for permit in [false, true] {
            for annex in [false, true] {
                for has_team in [false, true] {
                    let status = DocumentStatus {
                        permit: doc(permit),
                        annex: doc(annex),
                        dive_count: 0,
                        log_count: 0,
                        has_team,
                    };
                    assert_eq!(can_execute(&status), permit && annex && has_team);
                    assert_eq!(
                        unmet_requirements(&status).is_empty(),
                        permit && annex && has_team
                    );
                }
            }
        }
    }

    #[test]
    fn missing_documents_close_the_gate() {
        let status = DocumentStatus {
            has_team: true,
            ..DocumentStatus::default()
        };
        assert!(!can_execute(&status));
        assert_eq!(
            unmet_requirements(&status),
            vec![Requirement::SignedWorkPermit, Requirement::SignedSafetyAnnex]
        );
    }

    #[test]
    fn unknown_operation_is_not_executable() {
        let (_dir, storage) = test_storage();
        assert!(!can_execute_operation(&storage, Uuid::new_v4()));
    }

    #[test]
    fn gate_revalidates_as_inputs_change() {
        let (_dir, storage) = test_storage();
        let op = sample_operation();
        storage.create_operation(&op).unwrap();
        storage
            .submit_document(&unsigned_document(op.id, DocumentKind::WorkPermit))
            .unwrap();
        storage
            .submit_document(&unsigned_document(op.id, DocumentKind::SafetyAnnex))
            .unwrap();

        let (_, c) =
            sign_document(&storage, op.id, DocumentKind::WorkPermit, "sup", Timestamp::now())
                .unwrap();
        assert!(!c.executable);
        assert_eq!(c.step, WorkflowStep::SafetyAnnex);

        let (_, c) =
            sign_document(&storage, op.id, DocumentKind::SafetyAnnex, "sup", Timestamp::now())
                .unwrap();
        assert!(!c.executable);
        assert_eq!(c.unmet, vec![Requirement::AssignedTeam]);
        assert_eq!(c.step, WorkflowStep::Dive);

        let c = assign_team(&storage, op.id, Some(Uuid::new_v4())).unwrap();
        assert!(c.executable);
        assert!(can_execute_operation(&storage, op.id));

        // Taking the team away closes the gate again.
        let c = assign_team(&storage, op.id, None).unwrap();
        assert!(!c.executable);
        assert!(!can_execute_operation(&storage, op.id));
    }
}
