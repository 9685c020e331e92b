//! Dive types: a single immersion, its lifecycle, and its depth history.

use jiff::{
    Timestamp,
    civil::{Date, Time},
    tz::TimeZone,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single timed underwater work session.
///
/// Either tied to an operation or independent (`operation_id` is `None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dive {
    pub id: Uuid,

    /// The operation this dive executes, or `None` for an independent dive.
    pub operation_id: Option<Uuid>,

    /// Human-readable dive code shown in alerts (e.g. `OP12-D03`).
    pub code: String,

    pub site: String,
    pub planned_max_depth_m: f64,
    pub planned_bottom_time_min: Option<u32>,
    pub state: DiveState,

    /// Scheduled day of the dive, in the company's local time zone.
    pub date: Date,

    /// Local start time. Set when the dive is scheduled or when it starts.
    pub start_time: Option<Time>,

    /// Who receives this dive's safety alerts.
    pub supervisor: Option<String>,

    pub created_at: Timestamp,
}

impl Dive {
    /// The instant the dive started, from its local date and start time.
    ///
    /// `None` if no start time is recorded or the local time does not exist
    /// in `tz`.
    pub fn started_at(&self, tz: &TimeZone) -> Option<Timestamp> {
        let time = self.start_time?;
        let zoned = self.date.to_datetime(time).to_zoned(tz.clone()).ok()?;
        Some(zoned.timestamp())
    }

    pub fn is_independent(&self) -> bool {
        self.operation_id.is_none()
    }
}

/// Where a dive stands in its lifecycle.
///
/// ```text
/// planned ──▶ in_progress ──▶ completed
///    │             │
///    └─────────────┴──▶ cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiveState {
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

impl DiveState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(Self::Planned),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Planned, Self::InProgress | Self::Cancelled)
                | (Self::InProgress, Self::Completed | Self::Cancelled)
        )
    }

    /// Completed and cancelled dives accept no further changes.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for DiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One depth observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthSample {
    pub depth_m: f64,
    pub recorded_at: Timestamp,
}

/// The log recorded after a dive. Only its existence matters to the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiveLog {
    pub id: Uuid,
    pub dive_id: Uuid,
    pub notes: Option<String>,
    pub recorded_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::civil::{date, time};

    #[test]
    fn lifecycle_transitions() {
        use DiveState::*;

        assert!(Planned.can_transition_to(InProgress));
        assert!(Planned.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Cancelled));

        assert!(!Planned.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(Planned));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Cancelled.can_transition_to(InProgress));
        assert!(!Completed.can_transition_to(Cancelled));
    }

    #[test]
    fn started_at_combines_date_and_time() {
        let dive = Dive {
            id: Uuid::new_v4(),
            operation_id: None,
            code: "D-1".into(),
            site: "Harbor".into(),
            planned_max_depth_m: 20.0,
            planned_bottom_time_min: None,
            state: DiveState::InProgress,
            date: date(2024, 3, 1),
            start_time: Some(time(9, 30, 0, 0)),
            supervisor: None,
            created_at: Timestamp::now(),
        };

        let started = dive.started_at(&TimeZone::UTC).unwrap();
        assert_eq!(started.to_string(), "2024-03-01T09:30:00Z");
    }

    #[test]
    fn started_at_none_without_start_time() {
        let dive = Dive {
            id: Uuid::new_v4(),
            operation_id: None,
            code: "D-1".into(),
            site: "Harbor".into(),
            planned_max_depth_m: 20.0,
            planned_bottom_time_min: Some(30),
            state: DiveState::Planned,
            date: date(2024, 3, 1),
            start_time: None,
            supervisor: None,
            created_at: Timestamp::now(),
        };

        assert!(dive.started_at(&TimeZone::UTC).is_none());
    }
}
