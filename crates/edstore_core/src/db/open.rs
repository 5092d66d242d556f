//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by the document store.
//!
//! # Invariants
//! - File connections run in WAL mode so readers do not block the writer.
//! - Every connection carries the configured busy timeout.
//! - Opening a connection never applies migrations; that is
//!   `ConnectionPool::bootstrap_schema`'s job.

use super::DbResult;
use log::{debug, error};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens one SQLite database file connection and configures it.
///
/// # Side effects
/// - Creates the database file when it does not exist yet.
/// - Emits `db_open` logging events on failure.
pub fn open_connection(path: impl AsRef<Path>, busy_timeout: Duration) -> DbResult<Connection> {
    let started_at = Instant::now();
    let path = path.as_ref();

    let conn = match Connection::open(path) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=file path={} duration_ms={} error_code=db_open_failed error={}",
                path.display(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    if let Err(err) = configure_connection(&conn, busy_timeout, true) {
        error!(
            "event=db_open module=db status=error mode=file path={} duration_ms={} error_code=db_configure_failed error={}",
            path.display(),
            started_at.elapsed().as_millis(),
            err
        );
        return Err(err);
    }

    debug!(
        "event=db_open module=db status=ok mode=file path={} duration_ms={}",
        path.display(),
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}

/// Opens a private in-memory SQLite connection and configures it.
///
/// The database lives exactly as long as the returned connection.
pub fn open_connection_in_memory() -> DbResult<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_connection(&conn, Duration::ZERO, false)?;
    debug!("event=db_open module=db status=ok mode=memory");
    Ok(conn)
}

/// Applies store pragmas to an already opened connection.
pub fn configure_connection(
    conn: &Connection,
    busy_timeout: Duration,
    file_backed: bool,
) -> DbResult<()> {
    if file_backed {
        // journal_mode returns the resulting mode as a row.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
    }
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}
