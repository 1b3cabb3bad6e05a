//! SQLite persistence for scenarios and responses.
//!
//! One connection behind a mutex. Every method takes the lock, runs its
//! statements and releases it before returning, so callers never hold it
//! across an `.await`. Calls are synchronous: HTTP read paths run them on the
//! blocking pool, the model-calling services run them inline.

mod responses;
mod scenarios;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_DATABASE_PATH: &str = "./carecomm.db";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    #[error("Database lock poisoned")]
    LockPoisoned,
}

/// Where the store lives, resolved from `DATABASE_URL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Memory,
    File(PathBuf),
}

impl DatabaseTarget {
    /// Accepts `sqlite::memory:`, `sqlite://<path>`, `sqlite:<path>` or a bare
    /// path. Any other scheme (e.g. a Postgres URL) falls back to the default
    /// SQLite file.
    pub fn from_url(url: &str) -> Self {
        let url = url.trim();
        if url.is_empty() {
            return DatabaseTarget::File(PathBuf::from(DEFAULT_DATABASE_PATH));
        }
        if matches!(url, "sqlite::memory:" | "sqlite://:memory:" | ":memory:") {
            return DatabaseTarget::Memory;
        }
        if let Some(rest) = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:")) {
            // sqlite:///abs/path keeps its leading slash after stripping "sqlite://"
            return DatabaseTarget::File(PathBuf::from(rest));
        }
        if url.contains("://") {
            warn!(target: "carecomm_backend", scheme = %url.split("://").next().unwrap_or_default(),
                  "Unsupported database scheme; falling back to SQLite");
            return DatabaseTarget::File(PathBuf::from(DEFAULT_DATABASE_PATH));
        }
        DatabaseTarget::File(PathBuf::from(url))
    }
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(target: &DatabaseTarget) -> Result<Self, DatabaseError> {
        match target {
            DatabaseTarget::Memory => Self::open_in_memory(),
            DatabaseTarget::File(path) => Self::open_path(path),
        }
    }

    pub fn open_path(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path)?;
        info!(target: "carecomm_backend", path = %path.display(), "Opened SQLite database");
        Self::from_connection(conn)
    }

    /// In-memory store (tests, `sqlite::memory:`).
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    /// Cheap liveness probe used by the health endpoint.
    pub fn ping(&self) -> Result<(), DatabaseError> {
        self.conn()?.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(())
}

/// Run all pending migrations. Safe to call repeatedly.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = current_version(conn);

    let migrations: [(i64, &str); 1] = [(1, include_str!("../../migrations/001_initial.sql"))];

    for (version, sql) in migrations {
        if version > current_version {
            info!(target: "carecomm_backend", version, "Running migration");
            conn.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }
    Ok(())
}

/// 0 when the schema does not exist yet.
fn current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i64>>(0)
    })
    .ok()
    .flatten()
    .unwrap_or(0)
}

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(table: &'static str, raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Corrupt { table, reason: format!("bad timestamp '{raw}': {e}") })
}
