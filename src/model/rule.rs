//! Safety alert rules: administrator-edited thresholds the engine reads.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Ascent rate limit used when a rule does not configure a usable one.
pub const DEFAULT_MAX_ASCENT_RATE_M_PER_MIN: f64 = 10.0;

/// The closed set of safety checks.
///
/// Each variant has exactly one evaluator in [`crate::safety`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    DepthLimit,
    AscentRate,
    BottomTime,
}

impl RuleKind {
    pub const ALL: [Self; 3] = [Self::DepthLimit, Self::AscentRate, Self::BottomTime];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DepthLimit => "DEPTH_LIMIT",
            Self::AscentRate => "ASCENT_RATE",
            Self::BottomTime => "BOTTOM_TIME",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEPTH_LIMIT" => Some(Self::DepthLimit),
            "ASCENT_RATE" => Some(Self::AscentRate),
            "BOTTOM_TIME" => Some(Self::BottomTime),
            _ => None,
        }
    }

    /// Whether at most one unacknowledged alert of this kind may exist per dive.
    ///
    /// Ascent rate alerts are not deduplicated: every fast ascent is its own
    /// safety event.
    pub fn is_deduplicated(self) -> bool {
        match self {
            Self::DepthLimit | Self::BottomTime => true,
            Self::AscentRate => false,
        }
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Alert severity. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured safety check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyAlertRule {
    pub id: Uuid,
    pub kind: RuleKind,

    /// Kind-specific settings as a free-form JSON object.
    ///
    /// Read leniently: missing or malformed values fall back to defaults.
    pub config: Value,

    pub priority: Priority,
    pub enabled: bool,
    pub created_at: Timestamp,
}

impl SafetyAlertRule {
    /// The ascent rate threshold in metres per minute.
    ///
    /// Accepts a JSON number or a numeric string. Anything else, including
    /// zero, negative or non-finite values, yields
    /// [`DEFAULT_MAX_ASCENT_RATE_M_PER_MIN`].
    pub fn max_ascent_rate_m_per_min(&self) -> f64 {
        let value = self.config.get("max_ascent_rate_m_per_min");
        value
            .and_then(|v| {
                v.as_f64()
                    .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            })
            .filter(|rate: &f64| rate.is_finite() && *rate > 0.0)
            .unwrap_or(DEFAULT_MAX_ASCENT_RATE_M_PER_MIN)
    }
}
