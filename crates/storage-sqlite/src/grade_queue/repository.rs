//! Repository implementing the queue-store contract over one SQLite table.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use kelasi_core::errors::{QueueError, Result};
use kelasi_core::sync::{
    EvalType, GradePayload, MutationKind, QueueItem, QueueStatus, QueueStore,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS grade_queue (
    id            TEXT PRIMARY KEY,
    kind          TEXT NOT NULL,
    student_id    TEXT NOT NULL,
    subject_id    TEXT NOT NULL,
    term_id       TEXT NOT NULL,
    eval_type     TEXT NOT NULL,
    score         REAL NOT NULL,
    observation   TEXT,
    enqueued_at   TEXT NOT NULL,
    status        TEXT NOT NULL,
    error_message TEXT
);
CREATE INDEX IF NOT EXISTS idx_grade_queue_status ON grade_queue (status);
CREATE INDEX IF NOT EXISTS idx_grade_queue_cell
    ON grade_queue (student_id, subject_id, term_id, eval_type);
";

const SELECT_COLUMNS: &str = "id, kind, student_id, subject_id, term_id, eval_type, \
     score, observation, enqueued_at, status, error_message";

fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

fn storage_err(err: rusqlite::Error) -> QueueError {
    QueueError::storage(err.to_string())
}

/// Raw row image of one queued mutation.
struct QueueRowDB {
    id: String,
    kind: String,
    student_id: String,
    subject_id: String,
    term_id: String,
    eval_type: String,
    score: f64,
    observation: Option<String>,
    enqueued_at: String,
    status: String,
    error_message: Option<String>,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueRowDB> {
    Ok(QueueRowDB {
        id: row.get(0)?,
        kind: row.get(1)?,
        student_id: row.get(2)?,
        subject_id: row.get(3)?,
        term_id: row.get(4)?,
        eval_type: row.get(5)?,
        score: row.get(6)?,
        observation: row.get(7)?,
        enqueued_at: row.get(8)?,
        status: row.get(9)?,
        error_message: row.get(10)?,
    })
}

fn to_item(row: QueueRowDB) -> Result<QueueItem> {
    Ok(QueueItem {
        id: row.id,
        kind: enum_from_db::<MutationKind>(&row.kind)?,
        payload: GradePayload {
            student_id: row.student_id,
            subject_id: row.subject_id,
            term_id: row.term_id,
            eval_type: enum_from_db::<EvalType>(&row.eval_type)?,
            score: row.score,
            observation: row.observation,
        },
        enqueued_at: row.enqueued_at,
        status: enum_from_db::<QueueStatus>(&row.status)?,
        error_message: row.error_message,
    })
}

/// Durable queue store over a single SQLite table.
///
/// Each trait operation is one statement, so operations are atomic without
/// an explicit transaction. Listing follows `rowid`, which preserves
/// insertion order.
pub struct SqliteQueueStore {
    conn: Mutex<Connection>,
}

impl SqliteQueueStore {
    /// Open (or create) the queue database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(storage_err)?;
        Self::from_connection(conn)
    }

    /// Open an ephemeral in-memory queue database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| QueueError::storage("Queue connection lock is poisoned"))
    }

    fn list_by_status(&self, status: QueueStatus) -> Result<Vec<QueueItem>> {
        let conn = self.lock()?;
        let mut statement = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM grade_queue WHERE status = ?1 ORDER BY rowid"
            ))
            .map_err(storage_err)?;
        let rows = statement
            .query_map(params![enum_to_db(&status)?], read_row)
            .map_err(storage_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err)?;
        rows.into_iter().map(to_item).collect()
    }

    fn set_status(&self, id: &str, status: QueueStatus, message: Option<&str>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE grade_queue SET status = ?1, error_message = ?2 WHERE id = ?3",
            params![enum_to_db(&status)?, message, id],
        )
        .map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn enqueue(&self, kind: MutationKind, payload: GradePayload) -> Result<String> {
        let conn = self.lock()?;
        let eval_type = enum_to_db(&payload.eval_type)?;

        // Coalesce into an existing pending/errored row for the same cell;
        // rows in flight keep their submitted payload.
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM grade_queue
                 WHERE student_id = ?1 AND subject_id = ?2 AND term_id = ?3
                   AND eval_type = ?4 AND status != ?5
                 ORDER BY rowid LIMIT 1",
                params![
                    payload.student_id,
                    payload.subject_id,
                    payload.term_id,
                    eval_type,
                    enum_to_db(&QueueStatus::Syncing)?,
                ],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;

        if let Some(id) = existing {
            conn.execute(
                "UPDATE grade_queue
                 SET score = ?1, observation = ?2, status = ?3, error_message = NULL
                 WHERE id = ?4",
                params![
                    payload.score,
                    payload.observation,
                    enum_to_db(&QueueStatus::Pending)?,
                    id,
                ],
            )
            .map_err(storage_err)?;
            return Ok(id);
        }

        let item = QueueItem::new(kind, payload);
        conn.execute(
            "INSERT INTO grade_queue
             (id, kind, student_id, subject_id, term_id, eval_type,
              score, observation, enqueued_at, status, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                item.id,
                enum_to_db(&item.kind)?,
                item.payload.student_id,
                item.payload.subject_id,
                item.payload.term_id,
                eval_type,
                item.payload.score,
                item.payload.observation,
                item.enqueued_at,
                enum_to_db(&item.status)?,
                item.error_message,
            ],
        )
        .map_err(storage_err)?;
        Ok(item.id)
    }

    async fn get(&self, id: &str) -> Result<Option<QueueItem>> {
        let row = {
            let conn = self.lock()?;
            conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM grade_queue WHERE id = ?1"),
                params![id],
                read_row,
            )
            .optional()
            .map_err(storage_err)?
        };
        row.map(to_item).transpose()
    }

    async fn list_pending(&self) -> Result<Vec<QueueItem>> {
        self.list_by_status(QueueStatus::Pending)
    }

    async fn list_errors(&self) -> Result<Vec<QueueItem>> {
        self.list_by_status(QueueStatus::Error)
    }

    async fn pending_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM grade_queue WHERE status = ?1",
                params![enum_to_db(&QueueStatus::Pending)?],
                |row| row.get(0),
            )
            .map_err(storage_err)?;
        Ok(count as usize)
    }

    async fn mark_syncing(&self, id: &str) -> Result<()> {
        self.set_status(id, QueueStatus::Syncing, None)
    }

    async fn mark_pending(&self, id: &str) -> Result<()> {
        self.set_status(id, QueueStatus::Pending, None)
    }

    async fn mark_error(&self, id: &str, message: &str) -> Result<()> {
        self.set_status(id, QueueStatus::Error, Some(message))
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM grade_queue WHERE id = ?1", params![id])
            .map_err(storage_err)?;
        Ok(())
    }

    async fn retry_errors(&self) -> Result<usize> {
        let conn = self.lock()?;
        let reset = conn
            .execute(
                "UPDATE grade_queue SET status = ?1, error_message = NULL WHERE status = ?2",
                params![
                    enum_to_db(&QueueStatus::Pending)?,
                    enum_to_db(&QueueStatus::Error)?,
                ],
            )
            .map_err(storage_err)?;
        Ok(reset)
    }
}
