//! SQLite storage bootstrap, pooling and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the document store.
//! - Own the fixed-size connection pool handed out one unit of work at a time.
//! - Apply schema migrations in deterministic order as an explicit startup step.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Repositories must not read/write documents before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub mod migrations;
mod open;
mod pool;
pub mod row_locks;

pub use open::{configure_connection, open_connection, open_connection_in_memory};
pub use pool::{ConnectionPool, PoolLocation};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// No pooled connection was returned within the checkout timeout.
    PoolTimeout { waited: Duration, pool_size: usize },
    /// Pool configuration cannot produce any usable connection.
    InvalidPoolConfig(String),
}

impl DbError {
    /// Returns `true` when SQLite refused a lock because another connection
    /// holds it (`SQLITE_BUSY` / `SQLITE_LOCKED`).
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Sqlite(err) => matches!(
                err.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::PoolTimeout { waited, pool_size } => write!(
                f,
                "no connection available from pool of {pool_size} after {}ms",
                waited.as_millis()
            ),
            Self::InvalidPoolConfig(message) => write!(f, "invalid pool configuration: {message}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::PoolTimeout { .. } => None,
            Self::InvalidPoolConfig(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
