//! Rule storage: the administrator-owned safety rule configuration.

use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use crate::model::{Priority, RuleKind, SafetyAlertRule};

use super::{Result, Storage, StorageError, parse_timestamp, parse_uuid};

impl Storage {
    pub fn create_rule(&self, rule: &SafetyAlertRule) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO safety_rules (id, kind, config, priority, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                rule.id.to_string(),
                rule.kind.as_str(),
                serde_json::to_string(&rule.config)?,
                rule.priority.as_str(),
                rule.enabled,
                rule.created_at.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Lists every rule, enabled or not, oldest first.
    pub fn list_rules(&self) -> Result<Vec<SafetyAlertRule>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, config, priority, enabled, created_at
             FROM safety_rules ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], RuleRow::read)?;
        rows.map(|r| r?.into_rule()).collect()
    }

    /// Lists enabled rules, optionally of a single kind, oldest first.
    pub fn list_enabled_rules(&self, kind: Option<RuleKind>) -> Result<Vec<SafetyAlertRule>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, config, priority, enabled, created_at
             FROM safety_rules
             WHERE enabled = 1 AND (?1 IS NULL OR kind = ?1)
             ORDER BY rowid",
        )?;
        let rows = stmt.query_map([kind.map(RuleKind::as_str)], RuleRow::read)?;
        rows.map(|r| r?.into_rule()).collect()
    }

    pub fn set_rule_enabled(&self, id: Uuid, enabled: bool) -> Result<SafetyAlertRule> {
        let conn = self.connect()?;
        let rows = conn.execute(
            "UPDATE safety_rules SET enabled = ?1 WHERE id = ?2",
            rusqlite::params![enabled, id.to_string()],
        )?;
        if rows == 0 {
            return Err(StorageError::RuleNotFound(id));
        }
        conn.query_row(
            "SELECT id, kind, config, priority, enabled, created_at
             FROM safety_rules WHERE id = ?1",
            [id.to_string()],
            RuleRow::read,
        )
        .optional()?
        .ok_or(StorageError::RuleNotFound(id))?
        .into_rule()
    }
}

struct RuleRow {
    id: String,
    kind: String,
    config: String,
    priority: String,
    enabled: bool,
    created_at: String,
}

impl RuleRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            config: row.get(2)?,
            priority: row.get(3)?,
            enabled: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    /// An unreadable config blob becomes `null`, which every rule reads as
    /// "use the defaults". Unknown kinds or priorities are corrupt rows.
    fn into_rule(self) -> Result<SafetyAlertRule> {
        let kind = RuleKind::parse(&self.kind)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown rule kind: {}", self.kind)))?;
        let priority = Priority::parse(&self.priority).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown rule priority: {}", self.priority))
        })?;
        let config = serde_json::from_str(&self.config).unwrap_or(serde_json::Value::Null);

        Ok(SafetyAlertRule {
            id: parse_uuid(&self.id, "rule id")?,
            kind,
            config,
            priority,
            enabled: self.enabled,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
        })
    }
}
