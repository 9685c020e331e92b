//! Dive planning and lifecycle.
//!
//! Dives under an operation pass the compliance gate when they are planned
//! and again when they start. Independent dives skip the gate and only need
//! a usable depth and a site.

use jiff::{
    Timestamp,
    civil::{Date, Time},
    tz::TimeZone,
};
use uuid::Uuid;

use crate::{
    compliance::{self, Requirement},
    model::{Dive, DiveLog, DiveState, OperationStatus},
    storage::{Storage, StorageError},
};

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("operation {operation_id} is not cleared for diving, missing: {}", join(.unmet))]
    ComplianceNotMet {
        operation_id: Uuid,
        unmet: Vec<Requirement>,
    },

    #[error("invalid dive: {0}")]
    InvalidDive(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = core::result::Result<T, PlanError>;

fn join(unmet: &[Requirement]) -> String {
    unmet
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Everything needed to put a dive on the schedule.
#[derive(Debug, Clone)]
pub struct DivePlan {
    pub operation_id: Option<Uuid>,
    pub code: String,
    pub site: String,
    pub planned_max_depth_m: f64,
    pub planned_bottom_time_min: Option<u32>,
    pub date: Date,
    pub start_time: Option<Time>,
    pub supervisor: Option<String>,
}

/// Schedules a new dive in the `planned` state.
pub fn plan_dive(storage: &Storage, plan: DivePlan) -> Result<Dive> {
    if let Some(operation_id) = plan.operation_id {
        require_gate(storage, operation_id)?;
    }
    validate(&plan)?;

    let dive = Dive {
        id: Uuid::new_v4(),
        operation_id: plan.operation_id,
        code: plan.code,
        site: plan.site.trim().to_string(),
        planned_max_depth_m: plan.planned_max_depth_m,
        planned_bottom_time_min: plan.planned_bottom_time_min,
        state: DiveState::Planned,
        date: plan.date,
        start_time: plan.start_time,
        supervisor: plan.supervisor,
        created_at: Timestamp::now(),
    };
    storage.create_dive(&dive)?;
    tracing::info!(dive_id = %dive.id, code = %dive.code, independent = dive.is_independent(), "dive planned");
    Ok(dive)
}

fn validate(plan: &DivePlan) -> Result<()> {
    if !plan.planned_max_depth_m.is_finite() || plan.planned_max_depth_m <= 0.0 {
        return Err(PlanError::InvalidDive(format!(
            "target depth must be a positive number of metres, got {}",
            plan.planned_max_depth_m
        )));
    }
    if plan.site.trim().is_empty() {
        return Err(PlanError::InvalidDive("site must not be empty".into()));
    }
    if plan.code.trim().is_empty() {
        return Err(PlanError::InvalidDive("dive code must not be empty".into()));
    }
    Ok(())
}

fn require_gate(storage: &Storage, operation_id: Uuid) -> Result<()> {
    // Surfaces a missing operation as such instead of as a closed gate.
    storage.load_operation(operation_id)?;
    let compliance = compliance::evaluate(storage, operation_id)?;
    if compliance.executable {
        return Ok(());
    }
    tracing::info!(%operation_id, unmet = ?compliance.unmet, "compliance gate refused dive");
    Err(PlanError::ComplianceNotMet {
        operation_id,
        unmet: compliance.unmet,
    })
}

/// Puts a planned dive in the water at `now`.
///
/// The local start is recorded in `tz` unless the plan already fixed one.
/// Starting the first dive of a planned operation moves the operation to
/// `in_progress`.
pub fn start_dive(storage: &Storage, dive_id: Uuid, now: Timestamp, tz: &TimeZone) -> Result<Dive> {
    let dive = storage.load_dive(dive_id)?;
    if let Some(operation_id) = dive.operation_id {
        require_gate(storage, operation_id)?;
    }

    let started = now.to_zoned(tz.clone()).datetime();
    let dive = storage.transition_dive(dive_id, DiveState::InProgress, Some(started))?;

    if let Some(operation_id) = dive.operation_id {
        let operation = storage.load_operation(operation_id)?;
        if operation.status == OperationStatus::Planned {
            storage.update_operation_status(operation_id, OperationStatus::InProgress)?;
            tracing::info!(%operation_id, "operation in progress");
        }
    }
    tracing::info!(%dive_id, code = %dive.code, "dive started");
    Ok(dive)
}

pub fn complete_dive(storage: &Storage, dive_id: Uuid) -> Result<Dive> {
    let dive = storage.transition_dive(dive_id, DiveState::Completed, None)?;
    tracing::info!(%dive_id, code = %dive.code, "dive completed");
    Ok(dive)
}

pub fn cancel_dive(storage: &Storage, dive_id: Uuid) -> Result<Dive> {
    let dive = storage.transition_dive(dive_id, DiveState::Cancelled, None)?;
    tracing::info!(%dive_id, code = %dive.code, "dive cancelled");
    Ok(dive)
}

/// Records the log for a dive that has ended.
pub fn record_log(
    storage: &Storage,
    dive_id: Uuid,
    notes: Option<String>,
    at: Timestamp,
) -> Result<DiveLog> {
    let dive = storage.load_dive(dive_id)?;
    if !dive.state.is_terminal() {
        return Err(PlanError::InvalidDive(format!(
            "dive {} is {}, a log can only be recorded once it has ended",
            dive.code, dive.state
        )));
    }

    let log = DiveLog {
        id: Uuid::new_v4(),
        dive_id,
        notes,
        recorded_at: at,
    };
    storage.record_dive_log(&log)?;
    tracing::info!(%dive_id, code = %dive.code, "dive log recorded");
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::civil::{date, time};

    use crate::{
        model::DocumentKind,
        storage::{
            operation::tests::{sample_operation, unsigned_document},
            test_support::test_storage,
        },
        workflow::{WorkflowStep, operation_step},
    };

    fn independent_plan() -> DivePlan {
        DivePlan {
            operation_id: None,
            code: "IND-007".into(),
            site: "Dock 4".into(),
            planned_max_depth_m: 18.0,
            planned_bottom_time_min: Some(40),
            date: date(2024, 6, 1),
            start_time: None,
            supervisor: Some("sup-anna".into()),
        }
    }

    /// An operation with both documents signed and a team assigned.
    fn cleared_operation(storage: &Storage) -> Uuid {
        let op = sample_operation();
        storage.create_operation(&op).unwrap();
        for kind in [DocumentKind::WorkPermit, DocumentKind::SafetyAnnex] {
            storage.submit_document(&unsigned_document(op.id, kind)).unwrap();
            storage
                .sign_document(op.id, kind, "sup-anna", Timestamp::now())
                .unwrap();
        }
        storage.assign_team(op.id, Some(Uuid::new_v4())).unwrap();
        op.id
    }

    #[test]
    fn independent_dive_skips_the_gate() {
        let (_dir, storage) = test_storage();
        let dive = plan_dive(&storage, independent_plan()).unwrap();
        assert!(dive.is_independent());
        assert_eq!(dive.state, DiveState::Planned);
    }

    #[test]
    fn independent_dive_needs_depth_and_site() {
        let (_dir, storage) = test_storage();
        for depth in [0.0, -3.0, f64::NAN] {
            let plan = DivePlan {
                planned_max_depth_m: depth,
                ..independent_plan()
            };
            assert!(matches!(
                plan_dive(&storage, plan),
                Err(PlanError::InvalidDive(_))
            ));
        }
        let plan = DivePlan {
            site: "   ".into(),
            ..independent_plan()
        };
        assert!(matches!(
            plan_dive(&storage, plan),
            Err(PlanError::InvalidDive(_))
        ));
        assert!(storage.list_dives(None).unwrap().is_empty());
    }

    #[test]
    fn non_compliant_operation_rejects_dive() {
        let (_dir, storage) = test_storage();
        let op = sample_operation();
        storage.create_operation(&op).unwrap();
        storage
            .submit_document(&unsigned_document(op.id, DocumentKind::WorkPermit))
            .unwrap();
        storage
            .sign_document(op.id, DocumentKind::WorkPermit, "sup-anna", Timestamp::now())
            .unwrap();

        let plan = DivePlan {
            operation_id: Some(op.id),
            ..independent_plan()
        };
        let err = plan_dive(&storage, plan).unwrap_err();
        let PlanError::ComplianceNotMet { unmet, .. } = &err else {
            panic!("expected ComplianceNotMet, got {err:?}");
        };
        assert_eq!(
            unmet,
            &vec![Requirement::SignedSafetyAnnex, Requirement::AssignedTeam]
        );
        assert!(err.to_string().contains("signed safety annex, assigned dive team"));
        assert!(storage.list_dives(Some(op.id)).unwrap().is_empty());
    }

    #[test]
    fn unknown_operation_is_not_found() {
        let (_dir, storage) = test_storage();
        let plan = DivePlan {
            operation_id: Some(Uuid::new_v4()),
            ..independent_plan()
        };
        assert!(matches!(
            plan_dive(&storage, plan),
            Err(PlanError::Storage(StorageError::OperationNotFound(_)))
        ));
    }

    #[test]
    fn full_operation_lifecycle() {
        let (_dir, storage) = test_storage();
        let op = cleared_operation(&storage);
        assert_eq!(operation_step(&storage, op), WorkflowStep::Dive);

        let dive = plan_dive(
            &storage,
            DivePlan {
                operation_id: Some(op),
                code: "OP1-D01".into(),
                ..independent_plan()
            },
        )
        .unwrap();
        assert_eq!(operation_step(&storage, op), WorkflowStep::Log);

        let now = Timestamp::from_second(1_717_232_400).unwrap(); // 2024-06-01T09:00:00Z
        let started = start_dive(&storage, dive.id, now, &TimeZone::UTC).unwrap();
        assert_eq!(started.start_time, Some(time(9, 0, 0, 0)));
        assert_eq!(
            storage.load_operation(op).unwrap().status,
            OperationStatus::InProgress
        );

        let err = record_log(&storage, dive.id, None, now).unwrap_err();
        assert!(matches!(err, PlanError::InvalidDive(_)));

        complete_dive(&storage, dive.id).unwrap();
        record_log(&storage, dive.id, Some("Inspection done".into()), now).unwrap();
        assert_eq!(operation_step(&storage, op), WorkflowStep::Completed);
    }

    #[test]
    fn start_rechecks_the_gate() {
        let (_dir, storage) = test_storage();
        let op = cleared_operation(&storage);
        let dive = plan_dive(
            &storage,
            DivePlan {
                operation_id: Some(op),
                ..independent_plan()
            },
        )
        .unwrap();

        storage.assign_team(op, None).unwrap();
        let err = start_dive(&storage, dive.id, Timestamp::now(), &TimeZone::UTC).unwrap_err();
        assert!(matches!(err, PlanError::ComplianceNotMet { .. }));
        assert_eq!(storage.load_dive(dive.id).unwrap().state, DiveState::Planned);
    }

    #[test]
    fn cancelled_dive_can_be_logged_but_not_restarted() {
        let (_dir, storage) = test_storage();
        let dive = plan_dive(&storage, independent_plan()).unwrap();
        cancel_dive(&storage, dive.id).unwrap();

        let err = start_dive(&storage, dive.id, Timestamp::now(), &TimeZone::UTC).unwrap_err();
        assert!(matches!(
            err,
            PlanError::Storage(StorageError::InvalidStateTransition {
                state: DiveState::Cancelled,
                ..
            })
        ));
        record_log(&storage, dive.id, None, Timestamp::now()).unwrap();
    }
}
