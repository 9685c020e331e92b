//! DEPTH_LIMIT: the diver went deeper than the dive plan allows.

use jiff::tz::TimeZone;

use crate::model::{AlertDetails, SafetyAlertRule};

use super::Snapshot;

/// Fires when the new sample is strictly deeper than the planned maximum.
pub(super) fn check(
    _rule: &SafetyAlertRule,
    snapshot: &Snapshot<'_>,
    _tz: &TimeZone,
) -> Option<AlertDetails> {
    let sample = snapshot.sample?;
    let max_depth_m = snapshot.dive.planned_max_depth_m;
    (sample.depth_m > max_depth_m).then(|| AlertDetails::DepthLimit {
        dive_code: snapshot.dive.code.clone(),
        depth_m: sample.depth_m,
        max_depth_m,
    })
}
