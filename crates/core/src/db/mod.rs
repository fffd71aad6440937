//! Run ledger: SQLite bookkeeping of pipeline runs.
//!
//! Lives as `runs.db` inside the persistent working directory. Each run
//! records the pipeline description hash, the requested goal, timestamps,
//! and the final status, so a frontend can answer "what produced the
//! artifacts in this directory" without re-deriving anything.

use std::path::Path;

use rusqlite::{params, Connection};
use thiserror::Error;

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Error type for ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },
}

/// Convenience result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Final state of a recorded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(text: &str) -> Option<Self> {
        match text {
            "running" => Some(RunStatus::Running),
            "succeeded" => Some(RunStatus::Succeeded),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }
}

/// One recorded pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    /// SHA-256 of the pipeline description file.
    pub pipeline_hash: String,
    /// Goal step name.
    pub goal_step: String,
    /// Requested targets, space-joined in `step:container:path:Kind` form.
    pub goals: String,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: Option<String>,
}

/// SQLite-backed run ledger.
///
/// A thin wrapper around `rusqlite::Connection` responsible for opening or
/// creating the DB file, applying schema migrations, and providing small
/// helpers over run records.
#[derive(Debug)]
pub struct RunLedger {
    conn: Connection,
}

impl RunLedger {
    /// Open (or create) the ledger at the given path and ensure the schema
    /// exists.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Insert a run record and return its row id.
    pub fn insert_run(&self, record: &RunRecord) -> LedgerResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO runs (pipeline_hash, goal_step, goals, status, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.pipeline_hash,
                record.goal_step,
                record.goals,
                record.status.as_str(),
                record.started_at,
                record.finished_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Update status and finish time for a run by row id.
    ///
    /// Returns the number of rows affected.
    pub fn finish_run(
        &self,
        id: i64,
        status: RunStatus,
        finished_at: &str,
    ) -> LedgerResult<usize> {
        let affected = self.conn.execute(
            r#"
            UPDATE runs
            SET status = ?1, finished_at = ?2
            WHERE id = ?3
            "#,
            params![status.as_str(), finished_at, id],
        )?;
        Ok(affected)
    }

    /// List all runs (ordered by id).
    pub fn list_runs(&self) -> LedgerResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT pipeline_hash, goal_step, goals, status, started_at, finished_at
            FROM runs
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            let status_text: String = row.get(3)?;
            Ok(RunRecord {
                pipeline_hash: row.get(0)?,
                goal_step: row.get(1)?,
                goals: row.get(2)?,
                status: RunStatus::from_str(&status_text).unwrap_or(RunStatus::Failed),
                started_at: row.get(4)?,
                finished_at: row.get(5)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// Apply schema migrations to bring the database to the latest version.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: initial schema (runs)
fn apply_migrations(conn: &Connection) -> LedgerResult<()> {
    let current_version = current_schema_version(conn)?;

    // Reject DBs created with a newer schema than we support.
    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(LedgerError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        // Initial schema.
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS runs (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                pipeline_hash TEXT NOT NULL,
                goal_step     TEXT NOT NULL,
                goals         TEXT NOT NULL,
                status        TEXT NOT NULL,
                started_at    TEXT NOT NULL,
                finished_at   TEXT
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> LedgerResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
