//! Scoped unit of work over one pooled connection.
//!
//! # Responsibility
//! - Check out a connection and open exactly one transaction on it.
//! - Guarantee commit-or-rollback before the connection returns to the pool.
//!
//! # Invariants
//! - An uncommitted session is rolled back on drop, on every exit path.
//! - Sessions are owned by a single call and never stored.

use super::{DbError, DbResult};
use log::{debug, warn};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::ops::Deref;

/// Transaction flavour requested for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// `BEGIN DEFERRED`: takes a read snapshot lazily.
    Read,
    /// `BEGIN IMMEDIATE`: takes the write lock up front, serializing
    /// check-then-write sequences across connections.
    Write,
}

impl SessionMode {
    fn begin_sql(self) -> &'static str {
        match self {
            Self::Read => "BEGIN DEFERRED;",
            Self::Write => "BEGIN IMMEDIATE;",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// RAII guard for one transaction on one pooled connection.
///
/// Dereferences to [`Connection`] for statement execution.
pub struct Session {
    conn: PooledConnection<SqliteConnectionManager>,
    mode: SessionMode,
    finished: bool,
}

impl Session {
    pub(crate) fn begin(
        conn: PooledConnection<SqliteConnectionManager>,
        mode: SessionMode,
    ) -> DbResult<Self> {
        conn.execute_batch(mode.begin_sql())?;
        Ok(Self {
            conn,
            mode,
            finished: false,
        })
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Commits the transaction and releases the connection.
    ///
    /// On failure the guard is dropped unfinished and rolls back.
    pub fn commit(mut self) -> DbResult<()> {
        self.conn
            .execute_batch("COMMIT;")
            .map_err(DbError::Sqlite)?;
        self.finished = true;
        Ok(())
    }

    /// Rolls back explicitly and releases the connection.
    pub fn rollback(mut self) -> DbResult<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK;")?;
        Ok(())
    }
}

impl Deref for Session {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        match self.conn.execute_batch("ROLLBACK;") {
            Ok(()) => debug!(
                "event=session_rollback module=db status=ok mode={}",
                self.mode.name()
            ),
            Err(err) => warn!(
                "event=session_rollback module=db status=error mode={} error={}",
                self.mode.name(),
                err
            ),
        }
    }
}
