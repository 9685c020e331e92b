//! Safety alerts: what the rule engine raises against a dive.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rule::{Priority, RuleKind};

/// An alert raised by a safety rule.
///
/// Created only by the rule engine. The only later change is acknowledgement
/// by a supervisor, which touches `acknowledged`, `acknowledged_at` and
/// `acknowledged_by` and nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyAlert {
    pub id: Uuid,
    pub dive_id: Uuid,
    pub rule_id: Uuid,
    pub kind: RuleKind,
    pub priority: Priority,
    pub details: AlertDetails,
    pub acknowledged: bool,
    pub acknowledged_at: Option<Timestamp>,
    pub acknowledged_by: Option<String>,
    pub created_at: Timestamp,
}

/// The values that triggered an alert.
///
/// Tagged so the stored JSON is self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AlertDetails {
    #[serde(rename_all = "camelCase")]
    DepthLimit {
        dive_code: String,
        depth_m: f64,
        max_depth_m: f64,
    },

    #[serde(rename_all = "camelCase")]
    AscentRate {
        dive_code: String,
        rate_m_per_min: f64,
        max_rate_m_per_min: f64,
        depth_change_m: f64,
        elapsed_sec: f64,
        from_depth_m: f64,
        to_depth_m: f64,
    },

    #[serde(rename_all = "camelCase")]
    BottomTime {
        dive_code: String,
        elapsed_min: f64,
        planned_min: u32,
    },
}

impl AlertDetails {
    pub fn kind(&self) -> RuleKind {
        match self {
            Self::DepthLimit { .. } => RuleKind::DepthLimit,
            Self::AscentRate { .. } => RuleKind::AscentRate,
            Self::BottomTime { .. } => RuleKind::BottomTime,
        }
    }

    pub fn dive_code(&self) -> &str {
        match self {
            Self::DepthLimit { dive_code, .. }
            | Self::AscentRate { dive_code, .. }
            | Self::BottomTime { dive_code, .. } => dive_code,
        }
    }

    /// One-line human-readable description.
    pub fn summary(&self) -> String {
        match self {
            Self::DepthLimit {
                dive_code,
                depth_m,
                max_depth_m,
            } => format!("{dive_code}: depth {depth_m:.1} m exceeds planned maximum {max_depth_m:.1} m"),
            Self::AscentRate {
                dive_code,
                rate_m_per_min,
                max_rate_m_per_min,
                from_depth_m,
                to_depth_m,
                ..
            } => format!(
                "{dive_code}: ascent {from_depth_m:.1} m -> {to_depth_m:.1} m at \
                 {rate_m_per_min:.1} m/min exceeds {max_rate_m_per_min:.1} m/min"
            ),
            Self::BottomTime {
                dive_code,
                elapsed_min,
                planned_min,
            } => format!(
                "{dive_code}: bottom time {elapsed_min:.0} min exceeds planned {planned_min} min"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_json_is_tagged() {
        let details = AlertDetails::DepthLimit {
            dive_code: "D-7".into(),
            depth_m: 32.5,
            max_depth_m: 30.0,
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["type"], "depthLimit");
        assert_eq!(json["diveCode"], "D-7");

        let back: AlertDetails = serde_json::from_value(json).unwrap();
        assert_eq!(back, details);
        assert_eq!(back.kind(), RuleKind::DepthLimit);
    }

    #[test]
    fn summary_mentions_dive_code_and_values() {
        let details = AlertDetails::BottomTime {
            dive_code: "D-9".into(),
            elapsed_min: 25.0,
            planned_min: 20,
        };
        assert_eq!(
            details.summary(),
            "D-9: bottom time 25 min exceeds planned 20 min"
        );
    }
}
