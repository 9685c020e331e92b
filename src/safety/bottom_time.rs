//! BOTTOM_TIME: the dive has been running longer than planned.

use jiff::tz::TimeZone;

use crate::model::{AlertDetails, DiveState, SafetyAlertRule};

use super::{Snapshot, minutes_between};

/// Fires while the dive is in progress, has a planned bottom time and a known
/// start, and more than the planned minutes have passed since that start.
pub(super) fn check(
    _rule: &SafetyAlertRule,
    snapshot: &Snapshot<'_>,
    tz: &TimeZone,
) -> Option<AlertDetails> {
    let dive = snapshot.dive;
    if dive.state != DiveState::InProgress {
        return None;
    }
    let planned_min = dive.planned_bottom_time_min?;
    let Some(started_at) = dive.started_at(tz) else {
        tracing::debug!(dive_id = %dive.id, "no start time, bottom time not checked");
        return None;
    };

    let elapsed_min = minutes_between(started_at, snapshot.now);
    (elapsed_min > f64::from(planned_min)).then(|| AlertDetails::BottomTime {
        dive_code: dive.code.clone(),
        elapsed_min,
        planned_min,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::{ToSpan, Timestamp, tz::TimeZone};

    use crate::{
        model::{Dive, Priority, RuleKind},
        safety::tests::{active_dive, rule, t0},
    };

    fn run_with(dive: &Dive, now: Timestamp, tz: &TimeZone) -> Option<AlertDetails> {
        let snapshot = Snapshot {
            dive,
            previous: None,
            sample: None,
            now,
        };
        check(&rule(RuleKind::BottomTime, Priority::Medium), &snapshot, tz)
    }

    #[test]
    fn twenty_five_minutes_on_a_twenty_minute_plan_fires() {
        let dive = active_dive();
        let details = run_with(&dive, t0() + 25.minutes(), &TimeZone::UTC).unwrap();
        assert_eq!(
            details,
            AlertDetails::BottomTime {
                dive_code: "OP1-D01".into(),
                elapsed_min: 25.0,
                planned_min: 20,
            }
        );
    }

    #[test]
    fn within_plan_is_fine() {
        let dive = active_dive();
        assert!(run_with(&dive, t0() + 20.minutes(), &TimeZone::UTC).is_none());
        assert!(run_with(&dive, t0() + 5.minutes(), &TimeZone::UTC).is_none());
    }

    #[test]
    fn only_in_progress_dives() {
        let mut dive = active_dive();
        dive.state = DiveState::Completed;
        assert!(run_with(&dive, t0() + 2.hours(), &TimeZone::UTC).is_none());
    }

    #[test]
    fn needs_plan_and_start() {
        let mut no_plan = active_dive();
        no_plan.planned_bottom_time_min = None;
        assert!(run_with(&no_plan, t0() + 2.hours(), &TimeZone::UTC).is_none());

        let mut no_start = active_dive();
        no_start.start_time = None;
        assert!(run_with(&no_start, t0() + 2.hours(), &TimeZone::UTC).is_none());
    }

    #[test]
    fn start_is_read_in_the_configured_zone() {
        // 09:00 at UTC+2 is 07:00Z, so at 09:00Z two hours have passed.
        let east = TimeZone::fixed(jiff::tz::offset(2));
        let dive = active_dive();
        assert!(run_with(&dive, t0(), &east).is_some());
        assert!(run_with(&dive, t0(), &TimeZone::UTC).is_none());
    }
}
