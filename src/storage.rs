//! Local persistence for operations, dives, rules and alerts.
//!
//! Everything lives in a single `SQLite` file. Each unit of work opens its own
//! connection, so a [`Storage`] can be shared freely across threads; `SQLite`
//! serializes writers and the busy timeout absorbs short contention.
//!
//! ```text
//! operations      documents      dives ──< depth_samples
//!                                  └──< dive_logs
//! safety_rules    safety_alerts
//! ```

pub(crate) mod alert;
pub(crate) mod dive;
pub(crate) mod operation;
pub(crate) mod rule;

use std::{fs, io, path::PathBuf, time::Duration};

use jiff::Timestamp;
use rusqlite::Connection;
use uuid::Uuid;

use crate::model::{DiveState, DocumentKind};

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("operation not found: {0}")]
    OperationNotFound(Uuid),

    #[error("dive not found: {0}")]
    DiveNotFound(Uuid),

    #[error("operation {operation_id} has no {}", .kind.label())]
    DocumentNotFound {
        operation_id: Uuid,
        kind: DocumentKind,
    },

    #[error("rule not found: {0}")]
    RuleNotFound(Uuid),

    #[error("alert not found: {0}")]
    AlertNotFound(Uuid),

    #[error("operation {operation_id} already has a {}", .kind.label())]
    DocumentAlreadyExists {
        operation_id: Uuid,
        kind: DocumentKind,
    },

    #[error("document {0} is already signed")]
    DocumentAlreadySigned(Uuid),

    #[error("dive {0} already has a log")]
    DiveLogAlreadyExists(Uuid),

    #[error("dive {dive_id} is {state}, cannot {action}")]
    InvalidStateTransition {
        dive_id: Uuid,
        state: DiveState,
        action: &'static str,
    },

    #[error("sample at {got} is older than the last sample of dive {dive_id} at {last}")]
    OutOfOrderSample {
        dive_id: Uuid,
        last: Timestamp,
        got: Timestamp,
    },

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, StorageError>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS operations (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    status      TEXT NOT NULL,
    team_id     TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id            TEXT PRIMARY KEY,
    operation_id  TEXT NOT NULL REFERENCES operations(id),
    kind          TEXT NOT NULL,
    signed        INTEGER NOT NULL DEFAULT 0,
    signed_at     TEXT,
    signed_by     TEXT,
    created_at    TEXT NOT NULL,
    UNIQUE (operation_id, kind)
);

CREATE TABLE IF NOT EXISTS dives (
    id                       TEXT PRIMARY KEY,
    operation_id             TEXT REFERENCES operations(id),
    code                     TEXT NOT NULL,
    site                     TEXT NOT NULL,
    planned_max_depth_m      REAL NOT NULL,
    planned_bottom_time_min  INTEGER,
    state                    TEXT NOT NULL,
    date                     TEXT NOT NULL,
    start_time               TEXT,
    supervisor               TEXT,
    created_at               TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS dives_by_operation ON dives (operation_id);

CREATE TABLE IF NOT EXISTS depth_samples (
    dive_id      TEXT NOT NULL REFERENCES dives(id),
    seq          INTEGER NOT NULL,
    depth_m      REAL NOT NULL,
    recorded_at  TEXT NOT NULL,
    PRIMARY KEY (dive_id, seq)
);

CREATE TABLE IF NOT EXISTS dive_logs (
    id           TEXT PRIMARY KEY,
    dive_id      TEXT NOT NULL UNIQUE REFERENCES dives(id),
    notes        TEXT,
    recorded_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS safety_rules (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    config      TEXT NOT NULL,
    priority    TEXT NOT NULL,
    enabled     INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS safety_alerts (
    id               TEXT PRIMARY KEY,
    dive_id          TEXT NOT NULL REFERENCES dives(id),
    rule_id          TEXT NOT NULL,
    kind             TEXT NOT NULL,
    priority         TEXT NOT NULL,
    details          TEXT NOT NULL,
    acknowledged     INTEGER NOT NULL DEFAULT 0,
    acknowledged_at  TEXT,
    acknowledged_by  TEXT,
    created_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS alerts_by_dive ON safety_alerts (dive_id, acknowledged);
";

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// `SQLite`-backed storage.
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    /// Opens (or creates) the database at `path` and ensures the schema exists.
    ///
    /// The parent directory is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let storage = Self { path };
        storage.connect()?.execute_batch(SCHEMA)?;
        Ok(storage)
    }

    /// Returns the default database path: `~/.diveops/diveops.sqlite`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".diveops").join("diveops.sqlite"))
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(conn)
    }
}

// ── Column helpers ──

fn parse_uuid(s: &str, what: &str) -> Result<Uuid> {
    s.parse::<Uuid>()
        .map_err(|e| StorageError::Corrupt(format!("invalid {what}: {e}")))
}

fn parse_timestamp(s: &str, what: &str) -> Result<Timestamp> {
    s.parse::<Timestamp>()
        .map_err(|e| StorageError::Corrupt(format!("invalid {what}: {e}")))
}

fn parse_opt_timestamp(s: Option<&str>, what: &str) -> Result<Option<Timestamp>> {
    s.map(|s| parse_timestamp(s, what)).transpose()
}

fn parse_opt_uuid(s: Option<&str>, what: &str) -> Result<Option<Uuid>> {
    s.map(|s| parse_uuid(s, what)).transpose()
}

#[cfg(test)]
pub(crate) mod test_support {
    use tempfile::TempDir;

    use super::Storage;

    pub(crate) fn test_storage() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("db").join("diveops.sqlite")).unwrap();
        (dir, storage)
    }
}
