//! ASCENT_RATE: the diver came up faster than the configured rate.
//!
//! Only the last two samples matter. Samples less than a second apart are
//! ignored so near-simultaneous readings cannot blow the rate up.

use jiff::tz::TimeZone;

use crate::model::{AlertDetails, SafetyAlertRule};

use super::{Snapshot, minutes_between};

/// Shortest interval between two samples that yields a meaningful rate.
const MIN_INTERVAL_MS: i64 = 1_000;

pub(super) fn check(
    rule: &SafetyAlertRule,
    snapshot: &Snapshot<'_>,
    _tz: &TimeZone,
) -> Option<AlertDetails> {
    let (previous, sample) = (snapshot.previous?, snapshot.sample?);
    if sample.depth_m >= previous.depth_m {
        return None;
    }

    let elapsed_ms =
        sample.recorded_at.as_millisecond() - previous.recorded_at.as_millisecond();
    if elapsed_ms < MIN_INTERVAL_MS {
        tracing::debug!(dive_id = %snapshot.dive.id, elapsed_ms, "samples too close for an ascent rate");
        return None;
    }

    let depth_change_m = previous.depth_m - sample.depth_m;
    let minutes = minutes_between(previous.recorded_at, sample.recorded_at);
    let rate_m_per_min = depth_change_m / minutes;
    let max_rate_m_per_min = rule.max_ascent_rate_m_per_min();

    (rate_m_per_min > max_rate_m_per_min).then(|| AlertDetails::AscentRate {
        dive_code: snapshot.dive.code.clone(),
        rate_m_per_min,
        max_rate_m_per_min,
        depth_change_m,
        elapsed_sec: minutes * 60.0,
        from_depth_m: previous.depth_m,
        to_depth_m: sample.depth_m,
    })
}
