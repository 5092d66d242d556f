//! Fixed-size SQLite connection pool.
//!
//! # Responsibility
//! - Own every connection to one database, created eagerly at construction.
//! - Lend exactly one connection per unit of work and take it back afterwards.
//! - Own the row lock table shared by all units of work on this database.
//!
//! # Invariants
//! - A checkout waits at most `checkout_timeout`; it never blocks forever.
//! - A connection is returned to the pool even when the borrower panics.
//! - Schema bootstrap is explicit (`bootstrap_schema`), never a side effect of
//!   the first checkout.

use super::migrations::{apply_migrations, current_version};
use super::open::{open_connection, open_connection_in_memory};
use super::row_locks::RowLockTable;
use super::{DbError, DbResult};
use crate::config::DatabaseConfig;
use log::{info, warn};
use parking_lot::{Condvar, Mutex};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where the pooled connections point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolLocation {
    File(PathBuf),
    /// Private in-memory database; the pool holds its only connection.
    Memory,
}

/// Explicitly constructed, explicitly owned pool of SQLite connections.
pub struct ConnectionPool {
    idle: Mutex<Vec<Connection>>,
    returned: Condvar,
    size: usize,
    checkout_timeout: Duration,
    location: PoolLocation,
    row_locks: Arc<RowLockTable>,
}

impl ConnectionPool {
    /// Opens `config.pool_size` connections to the configured database file.
    ///
    /// # Errors
    /// - Returns `InvalidPoolConfig` for a zero pool size.
    /// - Returns the SQLite error of the first connection that fails to open.
    pub fn open(config: &DatabaseConfig) -> DbResult<Self> {
        if config.pool_size == 0 {
            return Err(DbError::InvalidPoolConfig(
                "pool_size must be at least 1".to_string(),
            ));
        }

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let mut connections = Vec::with_capacity(config.pool_size);
        for _ in 0..config.pool_size {
            connections.push(open_connection(&config.path, busy_timeout)?);
        }

        info!(
            "event=pool_open module=db status=ok mode=file path={} size={}",
            config.path.display(),
            config.pool_size
        );
        Ok(Self::from_connections(
            connections,
            Duration::from_millis(config.checkout_timeout_ms),
            PoolLocation::File(config.path.clone()),
        ))
    }

    /// Opens a single-connection pool over a private in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = open_connection_in_memory()?;
        info!("event=pool_open module=db status=ok mode=memory size=1");
        Ok(Self::from_connections(
            vec![conn],
            Duration::from_secs(30),
            PoolLocation::Memory,
        ))
    }

    fn from_connections(
        connections: Vec<Connection>,
        checkout_timeout: Duration,
        location: PoolLocation,
    ) -> Self {
        Self {
            size: connections.len(),
            idle: Mutex::new(connections),
            returned: Condvar::new(),
            checkout_timeout,
            location,
            row_locks: Arc::new(RowLockTable::new()),
        }
    }

    /// Applies pending schema migrations. Call once at startup.
    ///
    /// Returns the number of migrations applied (0 when already current).
    pub fn bootstrap_schema(&self) -> DbResult<usize> {
        let started_at = Instant::now();
        let applied = self.with_connection(|conn| apply_migrations(conn))?;
        info!(
            "event=schema_bootstrap module=db status=ok applied={} duration_ms={}",
            applied,
            started_at.elapsed().as_millis()
        );
        Ok(applied)
    }

    /// Reads the schema version of the pooled database.
    pub fn schema_version(&self) -> DbResult<u32> {
        self.with_connection(|conn| current_version(conn))
    }

    /// Runs `work` on one checked-out connection.
    ///
    /// The connection is exclusively owned by `work` for its whole duration,
    /// which makes it the natural scope of one transaction.
    pub fn with_connection<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
        E: From<DbError>,
    {
        let mut checkout = self.checkout()?;
        match checkout.conn.as_mut() {
            Some(conn) => work(conn),
            None => Err(DbError::InvalidPoolConfig("checked out an empty slot".to_string()).into()),
        }
    }

    fn checkout(&self) -> DbResult<PooledConnection<'_>> {
        let started_at = Instant::now();
        let deadline = started_at + self.checkout_timeout;
        let mut idle = self.idle.lock();
        loop {
            if let Some(conn) = idle.pop() {
                return Ok(PooledConnection {
                    pool: self,
                    conn: Some(conn),
                });
            }
            if self.returned.wait_until(&mut idle, deadline).timed_out() && idle.is_empty() {
                warn!(
                    "event=pool_checkout module=db status=error error_code=pool_timeout size={} waited_ms={}",
                    self.size,
                    started_at.elapsed().as_millis()
                );
                return Err(DbError::PoolTimeout {
                    waited: started_at.elapsed(),
                    pool_size: self.size,
                });
            }
        }
    }

    fn give_back(&self, conn: Connection) {
        self.idle.lock().push(conn);
        self.returned.notify_one();
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn location(&self) -> &PoolLocation {
        &self.location
    }

    /// Lock table shared by every unit of work on this database.
    pub fn row_locks(&self) -> &Arc<RowLockTable> {
        &self.row_locks
    }
}

/// A connection on loan from the pool; returned on drop.
pub(crate) struct PooledConnection<'pool> {
    pool: &'pool ConnectionPool,
    conn: Option<Connection>,
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionPool;
    use crate::config::DatabaseConfig;
    use crate::db::migrations::latest_version;
    use crate::db::DbError;

    #[test]
    fn zero_sized_pool_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("store.sqlite3"),
            pool_size: 0,
            ..DatabaseConfig::default()
        };
        let err = ConnectionPool::open(&config).err().unwrap();
        assert!(matches!(err, DbError::InvalidPoolConfig(_)));
    }

    #[test]
    fn connection_returns_to_pool_after_work() {
        let pool = ConnectionPool::open_in_memory().unwrap();
        assert_eq!(pool.idle_count(), 1);

        let value: i64 = pool
            .with_connection(|conn| {
                conn.query_row("SELECT 40 + 2;", [], |row| row.get(0))
                    .map_err(DbError::from)
            })
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn bootstrap_is_explicit_and_idempotent() {
        let pool = ConnectionPool::open_in_memory().unwrap();
        assert_eq!(pool.schema_version().unwrap(), 0);

        assert_eq!(pool.bootstrap_schema().unwrap(), latest_version() as usize);
        assert_eq!(pool.bootstrap_schema().unwrap(), 0);
        assert_eq!(pool.schema_version().unwrap(), latest_version());
    }

    #[test]
    fn checkout_times_out_when_pool_is_drained() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("store.sqlite3"),
            pool_size: 1,
            checkout_timeout_ms: 20,
            ..DatabaseConfig::default()
        };
        let pool = ConnectionPool::open(&config).unwrap();

        let nested: Result<(), DbError> =
            pool.with_connection(|_outer| pool.with_connection(|_inner| Ok(())));
        assert!(matches!(nested, Err(DbError::PoolTimeout { pool_size: 1, .. })));
        assert_eq!(pool.idle_count(), 1);
    }
}
