//! Alert storage: batch insertion, lookup, and acknowledgement.

use jiff::Timestamp;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::model::{AlertDetails, Priority, RuleKind, SafetyAlert};

use super::{Result, Storage, StorageError, parse_opt_timestamp, parse_timestamp, parse_uuid};

const ALERT_COLUMNS: &str = "id, dive_id, rule_id, kind, priority, details, \
     acknowledged, acknowledged_at, acknowledged_by, created_at";

impl Storage {
    /// Stores a dive's candidate alerts as one batch and returns the ones
    /// that were kept.
    ///
    /// A candidate whose kind deduplicates is dropped when the dive already
    /// has an unacknowledged alert of that kind. The check and the insert run
    /// in one immediate transaction, so concurrent writers (other processes
    /// included) cannot both pass the check. Either every kept alert lands or
    /// none does.
    pub fn insert_new_alerts(
        &self,
        dive_id: Uuid,
        candidates: Vec<SafetyAlert>,
    ) -> Result<Vec<SafetyAlert>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let open = open_kinds(&tx, dive_id)?;
        let alerts: Vec<_> = candidates
            .into_iter()
            .filter(|c| !(c.kind.is_deduplicated() && open.contains(&c.kind)))
            .collect();
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO safety_alerts ({ALERT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ))?;
            for alert in &alerts {
                stmt.execute(rusqlite::params![
                    alert.id.to_string(),
                    alert.dive_id.to_string(),
                    alert.rule_id.to_string(),
                    alert.kind.as_str(),
                    alert.priority.as_str(),
                    serde_json::to_string(&alert.details)?,
                    alert.acknowledged,
                    alert.acknowledged_at.map(|t| t.to_string()),
                    &alert.acknowledged_by,
                    alert.created_at.to_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(alerts)
    }

    /// Lists alerts, oldest first, optionally for one dive and optionally
    /// only the unacknowledged ones.
    pub fn list_alerts(
        &self,
        dive_id: Option<Uuid>,
        unacknowledged_only: bool,
    ) -> Result<Vec<SafetyAlert>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM safety_alerts
             WHERE (?1 IS NULL OR dive_id = ?1) AND (?2 = 0 OR acknowledged = 0)
             ORDER BY rowid"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![dive_id.map(|id| id.to_string()), unacknowledged_only],
            AlertRow::read,
        )?;
        rows.map(|r| r?.into_alert()).collect()
    }

    /// Marks an alert as acknowledged by `by` at `at`.
    ///
    /// Only the acknowledgement fields change. Acknowledging an alert a second
    /// time leaves the first acknowledgement in place and returns the alert
    /// as stored.
    pub fn acknowledge_alert(&self, id: Uuid, by: &str, at: Timestamp) -> Result<SafetyAlert> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let alert = load_alert_row(&tx, id)?;
        if alert.acknowledged {
            return Ok(alert);
        }
        tx.execute(
            "UPDATE safety_alerts
             SET acknowledged = 1, acknowledged_at = ?1, acknowledged_by = ?2
             WHERE id = ?3",
            rusqlite::params![at.to_string(), by, id.to_string()],
        )?;
        let alert = load_alert_row(&tx, id)?;
        tx.commit()?;
        Ok(alert)
    }
}

/// Kinds with at least one unacknowledged alert on the dive.
fn open_kinds(conn: &Connection, dive_id: Uuid) -> Result<Vec<RuleKind>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT kind FROM safety_alerts WHERE dive_id = ?1 AND acknowledged = 0",
    )?;
    let rows = stmt.query_map([dive_id.to_string()], |row| row.get::<_, String>(0))?;
    rows.map(|kind| {
        let kind = kind?;
        RuleKind::parse(&kind)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown alert kind: {kind}")))
    })
    .collect()
}

fn load_alert_row(conn: &Connection, id: Uuid) -> Result<SafetyAlert> {
    conn.query_row(
        &format!("SELECT {ALERT_COLUMNS} FROM safety_alerts WHERE id = ?1"),
        [id.to_string()],
        AlertRow::read,
    )
    .optional()?
    .ok_or(StorageError::AlertNotFound(id))?
    .into_alert()
}

struct AlertRow {
    id: String,
    dive_id: String,
    rule_id: String,
    kind: String,
    priority: String,
    details: String,
    acknowledged: bool,
    acknowledged_at: Option<String>,
    acknowledged_by: Option<String>,
    created_at: String,
}

impl AlertRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            dive_id: row.get(1)?,
            rule_id: row.get(2)?,
            kind: row.get(3)?,
            priority: row.get(4)?,
            details: row.get(5)?,
            acknowledged: row.get(6)?,
            acknowledged_at: row.get(7)?,
            acknowledged_by: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_alert(self) -> Result<SafetyAlert> {
        let kind = RuleKind::parse(&self.kind)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown alert kind: {}", self.kind)))?;
        let priority = Priority::parse(&self.priority).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown alert priority: {}", self.priority))
        })?;
        let details: AlertDetails = serde_json::from_str(&self.details)?;
        if details.kind() != kind {
            return Err(StorageError::Corrupt(format!(
                "alert {} is {kind} but its details are {}",
                self.id,
                details.kind()
            )));
        }

        Ok(SafetyAlert {
            id: parse_uuid(&self.id, "alert id")?,
            dive_id: parse_uuid(&self.dive_id, "dive id")?,
            rule_id: parse_uuid(&self.rule_id, "rule id")?,
            kind,
            priority,
            details,
            acknowledged: self.acknowledged,
            acknowledged_at: parse_opt_timestamp(self.acknowledged_at.as_deref(), "acknowledged_at")?,
            acknowledged_by: self.acknowledged_by,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
        })
    }
}
