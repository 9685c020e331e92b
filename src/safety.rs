//! Safety rule engine: turns a dive snapshot into candidate alerts.
//!
//! The engine is pure. It never reads storage and never deduplicates; the
//! monitor hands it a consistent snapshot and passes whatever it returns to
//! the alert sink.
//!
//! Every [`RuleKind`] has exactly one evaluator module here, all with the
//! same signature. Adding a kind means adding a variant and a module.

mod ascent_rate;
mod bottom_time;
mod depth_limit;

use jiff::{Timestamp, tz::TimeZone};
use uuid::Uuid;

use crate::model::{AlertDetails, DepthSample, Dive, RuleKind, SafetyAlert, SafetyAlertRule};

/// What an evaluation pass looks at.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub dive: &'a Dive,

    /// The sample before `sample`, if any.
    pub previous: Option<DepthSample>,

    /// The sample that triggered this pass. `None` on a timer tick.
    pub sample: Option<DepthSample>,

    /// The instant the pass is evaluated at.
    pub now: Timestamp,
}

/// Evaluates enabled rules against dive snapshots.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    tz: TimeZone,
}

impl RuleEngine {
    /// `tz` is the zone a dive's local date and start time are read in.
    pub fn new(tz: TimeZone) -> Self {
        Self { tz }
    }

    /// Runs every kind with an enabled rule against the snapshot.
    ///
    /// Kinds without an enabled rule are skipped. Returns at most one
    /// candidate per kind.
    pub fn evaluate(&self, rules: &[SafetyAlertRule], snapshot: &Snapshot<'_>) -> Vec<SafetyAlert> {
        RuleKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let Some(rule) = select_rule(rules, kind) else {
                    tracing::debug!(%kind, "no enabled rule, check skipped");
                    return None;
                };
                let details = self.check(rule, snapshot)?;
                Some(new_alert(snapshot.dive.id, rule, details))
            })
            .collect()
    }

    fn check(&self, rule: &SafetyAlertRule, snapshot: &Snapshot<'_>) -> Option<AlertDetails> {
        match rule.kind {
            RuleKind::DepthLimit => depth_limit::check(rule, snapshot, &self.tz),
            RuleKind::AscentRate => ascent_rate::check(rule, snapshot, &self.tz),
            RuleKind::BottomTime => bottom_time::check(rule, snapshot, &self.tz),
        }
    }
}

/// The rule that speaks for `kind`: the most severe enabled one, the oldest
/// on a tie.
pub fn select_rule(rules: &[SafetyAlertRule], kind: RuleKind) -> Option<&SafetyAlertRule> {
    rules
        .iter()
        .filter(|r| r.enabled && r.kind == kind)
        .max_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
        })
}

fn new_alert(dive_id: Uuid, rule: &SafetyAlertRule, details: AlertDetails) -> SafetyAlert {
    SafetyAlert {
        id: Uuid::new_v4(),
        dive_id,
        rule_id: rule.id,
        kind: rule.kind,
        priority: rule.priority,
        details,
        acknowledged: false,
        acknowledged_at: None,
        acknowledged_by: None,
        created_at: Timestamp::now(),
    }
}

/// Milliseconds from `from` to `to`, as minutes.
#[allow(clippy::cast_precision_loss)] // Millisecond spans of a dive fit easily in an f64 mantissa.
fn minutes_between(from: Timestamp, to: Timestamp) -> f64 {
    (to.as_millisecond() - from.as_millisecond()) as f64 / 60_000.0
}
