//! Dive storage: dives, their lifecycle, depth history and logs.
//!
//! Depth samples are numbered per dive in arrival order. The append path
//! re-reads the dive and its last sample inside the same write transaction
//! as the insert, so callers get a snapshot no concurrent writer can split.

use jiff::{
    Timestamp,
    civil::{Date, DateTime, Time},
};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::model::{DepthSample, Dive, DiveLog, DiveState};

use super::{Result, Storage, StorageError, parse_opt_uuid, parse_timestamp, parse_uuid};

const DIVE_COLUMNS: &str = "id, operation_id, code, site, planned_max_depth_m, \
     planned_bottom_time_min, state, date, start_time, supervisor, created_at";

/// The outcome of appending a depth sample: the dive as it was when the
/// sample went in, the sample before it, and the sample itself.
#[derive(Debug, Clone)]
pub struct AppendedSample {
    pub dive: Dive,
    pub previous: Option<DepthSample>,
    pub sample: DepthSample,
}

impl Storage {
    // ── Dives ──

    /// Records a new dive. A dive tied to an operation requires that
    /// operation to exist.
    pub fn create_dive(&self, dive: &Dive) -> Result<()> {
        let conn = self.connect()?;
        if let Some(operation_id) = dive.operation_id {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM operations WHERE id = ?1",
                    [operation_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if found.is_none() {
                return Err(StorageError::OperationNotFound(operation_id));
            }
        }
        conn.execute(
            &format!("INSERT INTO dives ({DIVE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
            rusqlite::params![
                dive.id.to_string(),
                dive.operation_id.map(|id| id.to_string()),
                &dive.code,
                &dive.site,
                dive.planned_max_depth_m,
                dive.planned_bottom_time_min,
                dive.state.as_str(),
                dive.date.to_string(),
                dive.start_time.map(|t| t.to_string()),
                &dive.supervisor,
                dive.created_at.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn load_dive(&self, id: Uuid) -> Result<Dive> {
        let conn = self.connect()?;
        load_dive_row(&conn, id)
    }

    /// Lists dives, oldest first. With an operation id, only that
    /// operation's dives.
    pub fn list_dives(&self, operation_id: Option<Uuid>) -> Result<Vec<Dive>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DIVE_COLUMNS} FROM dives
             WHERE ?1 IS NULL OR operation_id = ?1
             ORDER BY rowid"
        ))?;
        let rows = stmt.query_map([operation_id.map(|id| id.to_string())], DiveRow::read)?;
        rows.map(|r| r?.into_dive()).collect()
    }

    /// Lists dives currently in the water.
    pub fn list_active_dives(&self) -> Result<Vec<Dive>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DIVE_COLUMNS} FROM dives WHERE state = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt.query_map([DiveState::InProgress.as_str()], DiveRow::read)?;
        rows.map(|r| r?.into_dive()).collect()
    }

    /// Moves a dive to `next` if its lifecycle allows it.
    ///
    /// `started` records the local start of the dive when it has none yet;
    /// it only applies when entering `in_progress`.
    pub fn transition_dive(
        &self,
        id: Uuid,
        next: DiveState,
        started: Option<DateTime>,
    ) -> Result<Dive> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut dive = load_dive_row(&tx, id)?;
        if !dive.state.can_transition_to(next) {
            return Err(StorageError::InvalidStateTransition {
                dive_id: id,
                state: dive.state,
                action: transition_action(next),
            });
        }

        dive.state = next;
        if next == DiveState::InProgress
            && dive.start_time.is_none()
            && let Some(started) = started
        {
            dive.date = started.date();
            dive.start_time = Some(started.time());
        }

        tx.execute(
            "UPDATE dives SET state = ?1, date = ?2, start_time = ?3 WHERE id = ?4",
            rusqlite::params![
                dive.state.as_str(),
                dive.date.to_string(),
                dive.start_time.map(|t| t.to_string()),
                id.to_string(),
            ],
        )?;
        tx.commit()?;
        Ok(dive)
    }

    // ── Depth history ──

    /// Appends a depth sample to an in-progress dive.
    ///
    /// Fails with [`StorageError::InvalidStateTransition`] for any other
    /// state and with [`StorageError::OutOfOrderSample`] when the sample is
    /// older than the last one. Neither failure touches the history.
    pub fn append_sample(&self, dive_id: Uuid, sample: DepthSample) -> Result<AppendedSample> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let dive = load_dive_row(&tx, dive_id)?;
        if dive.state != DiveState::InProgress {
            return Err(StorageError::InvalidStateTransition {
                dive_id,
                state: dive.state,
                action: "record a depth sample",
            });
        }

        let last = last_sample_row(&tx, dive_id)?;
        if let Some((_, previous)) = &last
            && sample.recorded_at < previous.recorded_at
        {
            return Err(StorageError::OutOfOrderSample {
                dive_id,
                last: previous.recorded_at,
                got: sample.recorded_at,
            });
        }

        let seq = last.as_ref().map_or(0, |(seq, _)| seq + 1);
        tx.execute(
            "INSERT INTO depth_samples (dive_id, seq, depth_m, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                dive_id.to_string(),
                seq,
                sample.depth_m,
                sample.recorded_at.to_string(),
            ],
        )?;
        tx.commit()?;

        Ok(AppendedSample {
            dive,
            previous: last.map(|(_, s)| s),
            sample,
        })
    }

    /// Loads a dive's depth history in recording order.
    pub fn load_samples(&self, dive_id: Uuid) -> Result<Vec<DepthSample>> {
        let conn = self.connect()?;
        load_dive_row(&conn, dive_id)?;
        let mut stmt = conn.prepare(
            "SELECT depth_m, recorded_at FROM depth_samples WHERE dive_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map([dive_id.to_string()], |row| {
            Ok((row.get::<_, f64>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.map(|r| {
            let (depth_m, recorded_at) = r?;
            Ok(DepthSample {
                depth_m,
                recorded_at: parse_timestamp(&recorded_at, "recorded_at")?,
            })
        })
        .collect()
    }

    /// The dive's current depth reading: its last sample, if any.
    pub fn current_sample(&self, dive_id: Uuid) -> Result<Option<DepthSample>> {
        let conn = self.connect()?;
        load_dive_row(&conn, dive_id)?;
        Ok(last_sample_row(&conn, dive_id)?.map(|(_, s)| s))
    }

    // ── Logs ──

    /// Records the log for a dive. A dive has at most one log.
    pub fn record_dive_log(&self, log: &DiveLog) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        load_dive_row(&tx, log.dive_id)?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM dive_logs WHERE dive_id = ?1",
                [log.dive_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(StorageError::DiveLogAlreadyExists(log.dive_id));
        }

        tx.execute(
            "INSERT INTO dive_logs (id, dive_id, notes, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                log.id.to_string(),
                log.dive_id.to_string(),
                &log.notes,
                log.recorded_at.to_string(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn transition_action(next: DiveState) -> &'static str {
    match next {
        DiveState::Planned => "return to planned",
        DiveState::InProgress => "start",
        DiveState::Completed => "complete",
        DiveState::Cancelled => "cancel",
    }
}

fn load_dive_row(conn: &Connection, id: Uuid) -> Result<Dive> {
    conn.query_row(
        &format!("SELECT {DIVE_COLUMNS} FROM dives WHERE id = ?1"),
        [id.to_string()],
        DiveRow::read,
    )
    .optional()?
    .ok_or(StorageError::DiveNotFound(id))?
    .into_dive()
}

fn last_sample_row(conn: &Connection, dive_id: Uuid) -> Result<Option<(i64, DepthSample)>> {
    let row = conn
        .query_row(
            "SELECT seq, depth_m, recorded_at FROM depth_samples
             WHERE dive_id = ?1 ORDER BY seq DESC LIMIT 1",
            [dive_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;
    row.map(|(seq, depth_m, recorded_at)| {
        Ok((
            seq,
            DepthSample {
                depth_m,
                recorded_at: parse_timestamp(&recorded_at, "recorded_at")?,
            },
        ))
    })
    .transpose()
}

struct DiveRow {
    id: String,
    operation_id: Option<String>,
    code: String,
    site: String,
    planned_max_depth_m: f64,
    planned_bottom_time_min: Option<u32>,
    state: String,
    date: String,
    start_time: Option<String>,
    supervisor: Option<String>,
    created_at: String,
}

impl DiveRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            operation_id: row.get(1)?,
            code: row.get(2)?,
            site: row.get(3)?,
            planned_max_depth_m: row.get(4)?,
            planned_bottom_time_min: row.get(5)?,
            state: row.get(6)?,
            date: row.get(7)?,
            start_time: row.get(8)?,
            supervisor: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_dive(self) -> Result<Dive> {
        let state = DiveState::parse(&self.state)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown dive state: {}", self.state)))?;
        let date = self
            .date
            .parse::<Date>()
            .map_err(|e| StorageError::Corrupt(format!("invalid dive date: {e}")))?;
        let start_time = self
            .start_time
            .map(|t| t.parse::<Time>())
            .transpose()
            .map_err(|e| StorageError::Corrupt(format!("invalid start_time: {e}")))?;

        Ok(Dive {
            id: parse_uuid(&self.id, "dive id")?,
            operation_id: parse_opt_uuid(self.operation_id.as_deref(), "operation id")?,
            code: self.code,
            site: self.site,
            planned_max_depth_m: self.planned_max_depth_m,
            planned_bottom_time_min: self.planned_bottom_time_min,
            state,
            date,
            start_time,
            supervisor: self.supervisor,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
        })
    }
}
