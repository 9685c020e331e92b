//! Operation types: the planned diving job and its gating paperwork.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A planned diving job.
///
/// Owns at most one work-permit and one safety-annex, any number of dives,
/// and optionally the dive team assigned to carry it out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: Uuid,
    pub name: String,
    pub status: OperationStatus,

    /// The dive team assigned to this operation, if any.
    /// An operation without a team is never executable.
    pub team_id: Option<Uuid>,

    pub created_at: Timestamp,
}

/// Where an operation stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

impl OperationStatus {
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
}

/// The two compliance documents an operation needs before diving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    WorkPermit,
    SafetyAnnex,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WorkPermit => "work_permit",
            Self::SafetyAnnex => "safety_annex",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "work_permit" => Some(Self::WorkPermit),
            "safety_annex" => Some(Self::SafetyAnnex),
            _ => None,
        }
    }

    /// Display label, e.g. for CLI output.
    pub fn label(self) -> &'static str {
        match self {
            Self::WorkPermit => "work permit",
            Self::SafetyAnnex => "safety annex",
        }
    }
}

/// A work-permit or safety-annex attached to an operation.
///
/// Immutable once signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub operation_id: Uuid,
    pub kind: DocumentKind,
    pub signed: bool,
    pub signed_at: Option<Timestamp>,
    pub signed_by: Option<String>,
    pub created_at: Timestamp,
}
