//! Output formatting for CLI display.

use jiff::{Timestamp, tz::TimeZone};
use uuid::Uuid;

use crate::{
    compliance::Compliance,
    model::{Dive, SafetyAlert, SafetyAlertRule},
    workflow::DocumentState,
};

/// First eight hex digits of an ID.
pub(super) fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// A timestamp in the local zone, to the second.
pub(super) fn local_time(at: Timestamp, tz: &TimeZone) -> String {
    at.to_zoned(tz.clone()).strftime("%Y-%m-%d %H:%M:%S").to_string()
}

pub(super) fn format_dive(dive: &Dive) -> String {
    let start = dive
        .start_time
        .map_or_else(|| "--:--".to_string(), |t| t.strftime("%H:%M").to_string());
    let bottom = dive
        .planned_bottom_time_min
        .map_or_else(String::new, |m| format!(", {m} min"));
    format!(
        "{}  {:<10} [{}]  {} {}  {} (max {} m{bottom})",
        short_id(dive.id),
        dive.code,
        dive.state,
        dive.date,
        start,
        dive.site,
        dive.planned_max_depth_m,
    )
}

pub(super) fn format_alert(alert: &SafetyAlert, tz: &TimeZone) -> String {
    let ack = match (&alert.acknowledged_by, alert.acknowledged) {
        (Some(by), true) => format!("  (ack by {by})"),
        (None, true) => "  (ack)".to_string(),
        (_, false) => String::new(),
    };
    format!(
        "{}  {}  [{}] {}{ack}",
        short_id(alert.id),
        local_time(alert.created_at, tz),
        alert.priority,
        alert.details.summary(),
    )
}

pub(super) fn format_rule(rule: &SafetyAlertRule) -> String {
    let state = if rule.enabled { "enabled" } else { "disabled" };
    let config = if rule.config.is_null() || rule.config == serde_json::json!({}) {
        String::new()
    } else {
        format!("  {}", rule.config)
    };
    format!(
        "{}  {:<12} [{}] [{state}]{config}",
        short_id(rule.id),
        rule.kind,
        rule.priority,
    )
}

fn document_state(state: DocumentState) -> &'static str {
    match (state.exists, state.signed) {
        (false, _) => "missing",
        (true, false) => "unsigned",
        (true, true) => "signed",
    }
}

/// Multi-line view of an operation's workflow and gate.
pub(super) fn format_compliance(c: &Compliance) -> String {
    let gate = if c.executable {
        "open".to_string()
    } else {
        let unmet: Vec<String> = c.unmet.iter().map(ToString::to_string).collect();
        format!("closed (missing: {})", unmet.join(", "))
    };
    format!(
        "Work permit:  {}\n\
         Safety annex: {}\n\
         Team:         {}\n\
         Dives:        {} ({} logged)\n\
         Next step:    {}\n\
         Gate:         {gate}",
        document_state(c.status.permit),
        document_state(c.status.annex),
        if c.status.has_team { "assigned" } else { "none" },
        c.status.dive_count,
        c.status.log_count,
        c.step.label(),
    )
}
