//! Operation storage: operations, their compliance documents, and the
//! document registry view the workflow and gate read from.

use jiff::Timestamp;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::{
    model::{Document, DocumentKind, Operation, OperationStatus},
    workflow::{DocumentState, DocumentStatus},
};

use super::{Result, Storage, StorageError, parse_opt_timestamp, parse_opt_uuid, parse_timestamp, parse_uuid};

impl Storage {
    // ── Operations ──

    pub fn create_operation(&self, operation: &Operation) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO operations (id, name, status, team_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                operation.id.to_string(),
                &operation.name,
                operation.status.as_str(),
                operation.team_id.map(|t| t.to_string()),
                operation.created_at.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn load_operation(&self, id: Uuid) -> Result<Operation> {
        let conn = self.connect()?;
        load_operation_row(&conn, id)
    }

    /// Lists all operations, oldest first.
    pub fn list_operations(&self) -> Result<Vec<Operation>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, status, team_id, created_at FROM operations ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], OperationRow::read)?;
        rows.map(|r| r?.into_operation()).collect()
    }

    /// Assigns (or with `None`, unassigns) the operation's dive team.
    pub fn assign_team(&self, operation_id: Uuid, team_id: Option<Uuid>) -> Result<Operation> {
        let conn = self.connect()?;
        let rows = conn.execute(
            "UPDATE operations SET team_id = ?1 WHERE id = ?2",
            rusqlite::params![team_id.map(|t| t.to_string()), operation_id.to_string()],
        )?;
        if rows == 0 {
            return Err(StorageError::OperationNotFound(operation_id));
        }
        load_operation_row(&conn, operation_id)
    }

    pub fn update_operation_status(
        &self,
        operation_id: Uuid,
        status: OperationStatus,
    ) -> Result<()> {
        let conn = self.connect()?;
        let rows = conn.execute(
            "UPDATE operations SET status = ?1 WHERE id = ?2",
            rusqlite::params![status.as_str(), operation_id.to_string()],
        )?;
        if rows == 0 {
            return Err(StorageError::OperationNotFound(operation_id));
        }
        Ok(())
    }

    // ── Documents ──

    /// Records a submitted document. An operation holds at most one
    /// document of each kind.
    pub fn submit_document(&self, document: &Document) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        ensure_operation_exists(&tx, document.operation_id)?;
        if find_document(&tx, document.operation_id, document.kind)?.is_some() {
            return Err(StorageError::DocumentAlreadyExists {
                operation_id: document.operation_id,
                kind: document.kind,
            });
        }

        tx.execute(
            "INSERT INTO documents (id, operation_id, kind, signed, signed_at, signed_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                document.id.to_string(),
                document.operation_id.to_string(),
                document.kind.as_str(),
                document.signed,
                document.signed_at.map(|t| t.to_string()),
                &document.signed_by,
                document.created_at.to_string(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Signs the operation's document of the given kind.
    ///
    /// Signed documents are immutable: signing twice is an error.
    pub fn sign_document(
        &self,
        operation_id: Uuid,
        kind: DocumentKind,
        signed_by: &str,
        signed_at: Timestamp,
    ) -> Result<Document> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        ensure_operation_exists(&tx, operation_id)?;
        let Some(mut document) = find_document(&tx, operation_id, kind)? else {
            return Err(StorageError::DocumentNotFound { operation_id, kind });
        };
        if document.signed {
            return Err(StorageError::DocumentAlreadySigned(document.id));
        }

        tx.execute(
            "UPDATE documents SET signed = 1, signed_at = ?1, signed_by = ?2 WHERE id = ?3",
            rusqlite::params![signed_at.to_string(), signed_by, document.id.to_string()],
        )?;
        tx.commit()?;

        document.signed = true;
        document.signed_at = Some(signed_at);
        document.signed_by = Some(signed_by.to_string());
        Ok(document)
    }

    pub fn list_documents(&self, operation_id: Uuid) -> Result<Vec<Document>> {
        let conn = self.connect()?;
        ensure_operation_exists(&conn, operation_id)?;
        let mut stmt = conn.prepare(
            "SELECT id, operation_id, kind, signed, signed_at, signed_by, created_at
             FROM documents WHERE operation_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map([operation_id.to_string()], DocumentRow::read)?;
        rows.map(|r| r?.into_document()).collect()
    }

    // ── Document registry ──

    /// Reads the facts the workflow and the compliance gate are derived from,
    /// as one consistent snapshot.
    pub fn document_status(&self, operation_id: Uuid) -> Result<DocumentStatus> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let operation = load_operation_row(&tx, operation_id)?;
        let state_of = |doc: Option<Document>| {
            doc.map_or(DocumentState::MISSING, |d| DocumentState {
                exists: true,
                signed: d.signed,
            })
        };
        let permit = state_of(find_document(&tx, operation_id, DocumentKind::WorkPermit)?);
        let annex = state_of(find_document(&tx, operation_id, DocumentKind::SafetyAnnex)?);

        let dive_count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM dives WHERE operation_id = ?1",
            [operation_id.to_string()],
            |row| row.get(0),
        )?;
        let log_count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM dive_logs l JOIN dives d ON d.id = l.dive_id
             WHERE d.operation_id = ?1",
            [operation_id.to_string()],
            |row| row.get(0),
        )?;
        tx.commit()?;

        Ok(DocumentStatus {
            permit,
            annex,
            dive_count: u64::try_from(dive_count).unwrap_or(0),
            log_count: u64::try_from(log_count).unwrap_or(0),
            has_team: operation.team_id.is_some(),
        })
    }
}

fn ensure_operation_exists(conn: &Connection, id: Uuid) -> Result<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM operations WHERE id = ?1",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    found
        .map(|_| ())
        .ok_or(StorageError::OperationNotFound(id))
}

fn load_operation_row(conn: &Connection, id: Uuid) -> Result<Operation> {
    conn.query_row(
        "SELECT id, name, status, team_id, created_at FROM operations WHERE id = ?1",
        [id.to_string()],
        OperationRow::read,
    )
    .optional()?
    .ok_or(StorageError::OperationNotFound(id))?
    .into_operation()
}

fn find_document(conn: &Connection, operation_id: Uuid, kind: DocumentKind) -> Result<Option<Document>> {
    conn.query_row(
        "SELECT id, operation_id, kind, signed, signed_at, signed_by, created_at
         FROM documents WHERE operation_id = ?1 AND kind = ?2",
        rusqlite::params![operation_id.to_string(), kind.as_str()],
        DocumentRow::read,
    )
    .optional()?
    .map(DocumentRow::into_document)
    .transpose()
}

/// Raw operation columns, parsed into domain types after the query.
struct OperationRow {
    id: String,
    name: String,
    status: String,
    team_id: Option<String>,
    created_at: String,
}

impl OperationRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            status: row.get(2)?,
            team_id: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_operation(self) -> Result<Operation> {
        let status = OperationStatus::parse(&self.status).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown operation status: {}", self.status))
        })?;
        Ok(Operation {
            id: parse_uuid(&self.id, "operation id")?,
            name: self.name,
            status,
            team_id: parse_opt_uuid(self.team_id.as_deref(), "team id")?,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
        })
    }
}

struct DocumentRow {
    id: String,
    operation_id: String,
    kind: String,
    signed: bool,
    signed_at: Option<String>,
    signed_by: Option<String>,
    created_at: String,
}

impl DocumentRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            operation_id: row.get(1)?,
            kind: row.get(2)?,
            signed: row.get(3)?,
            signed_at: row.get(4)?,
            signed_by: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_document(self) -> Result<Document> {
        let kind = DocumentKind::parse(&self.kind)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown document kind: {}", self.kind)))?;
        Ok(Document {
            id: parse_uuid(&self.id, "document id")?,
            operation_id: parse_uuid(&self.operation_id, "operation id")?,
            kind,
            signed: self.signed,
            signed_at: parse_opt_timestamp(self.signed_at.as_deref(), "signed_at")?,
            signed_by: self.signed_by,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use crate::storage::test_support::test_storage;

    pub(crate) fn sample_operation() -> Operation {
        Operation {
            id: Uuid::new_v4(),
            name: "Pier 4 inspection".into(),
            status: OperationStatus::Planned,
            team_id: None,
            created_at: Timestamp::now(),
        }
    }

    pub(crate) fn unsigned_document(operation_id: Uuid, kind: DocumentKind) -> Document {
        Document {
            id: Uuid::new_v4(),
            operation_id,
            kind,
            signed: false,
            signed_at: None,
            signed_by: None,
            created_at: Timestamp::now(),
        }
    }

    #[test]
    fn create_and_load_operation() {
        let (_dir, storage) = test_storage();
        let op = sample_operation();

        storage.create_operation(&op).unwrap();
        let loaded = storage.load_operation(op.id).unwrap();

        assert_eq!(loaded.id, op.id);
        assert_eq!(loaded.name, op.name);
        assert_eq!(loaded.status, OperationStatus::Planned);
        assert!(loaded.team_id.is_none());
    }

    #[test]
    fn load_nonexistent_operation_fails() {
        let (_dir, storage) = test_storage();
        let err = storage.load_operation(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StorageError::OperationNotFound(_)));
    }

    #[test]
    fn assign_and_unassign_team() {
        let (_dir, storage) = test_storage();
        let op = sample_operation();
        storage.create_operation(&op).unwrap();

        let team = Uuid::new_v4();
        let updated = storage.assign_team(op.id, Some(team)).unwrap();
        assert_eq!(updated.team_id, Some(team));

        let updated = storage.assign_team(op.id, None).unwrap();
        assert!(updated.team_id.is_none());
    }

    #[test]
    fn assign_team_to_nonexistent_operation_fails() {
        let (_dir, storage) = test_storage();
        let err = storage
            .assign_team(Uuid::new_v4(), Some(Uuid::new_v4()))
            .unwrap_err();
        assert!(matches!(err, StorageError::OperationNotFound(_)));
    }

    #[test]
    fn second_document_of_same_kind_is_rejected() {
        let (_dir, storage) = test_storage();
        let op = sample_operation();
        storage.create_operation(&op).unwrap();

        storage
            .submit_document(&unsigned_document(op.id, DocumentKind::WorkPermit))
            .unwrap();
        let err = storage
            .submit_document(&unsigned_document(op.id, DocumentKind::WorkPermit))
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::DocumentAlreadyExists {
                kind: DocumentKind::WorkPermit,
                ..
            }
        ));

        // The other kind is still accepted.
        storage
            .submit_document(&unsigned_document(op.id, DocumentKind::SafetyAnnex))
            .unwrap();
    }

    #[test]
    fn sign_document_once() {
        let (_dir, storage) = test_storage();
        let op = sample_operation();
        storage.create_operation(&op).unwrap();
        storage
            .submit_document(&unsigned_document(op.id, DocumentKind::SafetyAnnex))
            .unwrap();

        let signed = storage
            .sign_document(op.id, DocumentKind::SafetyAnnex, "supervisor", Timestamp::now())
            .unwrap();
        assert!(signed.signed);
        assert_eq!(signed.signed_by.as_deref(), Some("supervisor"));

        let err = storage
            .sign_document(op.id, DocumentKind::SafetyAnnex, "supervisor", Timestamp::now())
            .unwrap_err();
        assert!(matches!(err, StorageError::DocumentAlreadySigned(id) if id == signed.id));

        let docs = storage.list_documents(op.id).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].signed);
    }

    #[test]
    fn sign_missing_document_fails() {
        let (_dir, storage) = test_storage();
        let op = sample_operation();
        storage.create_operation(&op).unwrap();

        let err = storage
            .sign_document(op.id, DocumentKind::WorkPermit, "supervisor", Timestamp::now())
            .unwrap_err();
        assert!(matches!(err, StorageError::DocumentNotFound { .. }));
    }

    #[test]
    fn document_status_of_fresh_operation() {
        let (_dir, storage) = test_storage();
        let op = sample_operation();
        storage.create_operation(&op).unwrap();

        let status = storage.document_status(op.id).unwrap();
        assert_eq!(status, DocumentStatus::default());
    }

    #[test]
    fn document_status_reflects_documents_and_team() {
        let (_dir, storage) = test_storage();
        let op = sample_operation();
        storage.create_operation(&op).unwrap();
        storage
            .submit_document(&unsigned_document(op.id, DocumentKind::WorkPermit))
            .unwrap();
        storage
            .submit_document(&unsigned_document(op.id, DocumentKind::SafetyAnnex))
            .unwrap();
        storage
            .sign_document(op.id, DocumentKind::WorkPermit, "supervisor", Timestamp::now())
            .unwrap();
        storage.assign_team(op.id, Some(Uuid::new_v4())).unwrap();

        let status = storage.document_status(op.id).unwrap();
        assert_eq!(
            status.permit,
            DocumentState {
                exists: true,
                signed: true
            }
        );
        assert_eq!(
            status.annex,
            DocumentState {
                exists: true,
                signed: false
            }
        );
        assert!(status.has_team);
    }

    #[test]
    fn document_status_of_nonexistent_operation_fails() {
        let (_dir, storage) = test_storage();
        let err = storage.document_status(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StorageError::OperationNotFound(_)));
    }

    #[test]
    fn list_operations_in_creation_order() {
        let (_dir, storage) = test_storage();
        let mut first = sample_operation();
        first.name = "First".into();
        let mut second = sample_operation();
        second.name = "Second".into();

        storage.create_operation(&first).unwrap();
        storage.create_operation(&second).unwrap();
        storage
            .update_operation_status(second.id, OperationStatus::InProgress)
            .unwrap();

        let ops = storage.list_operations().unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].name, "First");
        assert_eq!(ops[1].status, OperationStatus::InProgress);
    }
}
