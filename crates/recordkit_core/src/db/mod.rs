//! Storage engine, connection pool and per-call sessions.
//!
//! # Responsibility
//! - Own the single process-wide SQLite connection pool.
//! - Hand out strictly scoped sessions (one transaction per repository call).
//! - Create and introspect entity tables.
//!
//! # Invariants
//! - The shared engine is created at most once per process and never reconfigured.
//! - A session never outlives the repository call that opened it.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod engine;
pub mod schema;
mod session;

pub use engine::{shared_engine, Engine};
pub use schema::{ColumnReport, SchemaReport, TableReport};
pub use session::{Session, SessionMode};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Pool(r2d2::Error),
    InvalidConnectionString(String),
    /// The backing store could not be opened.
    Connection {
        target: String,
        source: rusqlite::Error,
    },
}

impl DbError {
    /// Whether the failure means the store is unreachable or busy, as opposed
    /// to a malformed statement or configuration.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Pool(_) | Self::Connection { .. } => true,
            Self::InvalidConnectionString(_) => false,
            Self::Sqlite(err) => matches!(
                err.sqlite_error_code(),
                Some(
                    rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                        | rusqlite::ErrorCode::NotADatabase
                        | rusqlite::ErrorCode::SystemIoFailure
                )
            ),
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Pool(err) => write!(f, "connection pool error: {err}"),
            Self::InvalidConnectionString(message) => {
                write!(f, "invalid connection string: {message}")
            }
            Self::Connection { target, source } => {
                write!(f, "cannot connect to `{target}`: {source}")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Pool(err) => Some(err),
            Self::InvalidConnectionString(_) => None,
            Self::Connection { source, .. } => Some(source),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<r2d2::Error> for DbError {
    fn from(value: r2d2::Error) -> Self {
        Self::Pool(value)
    }
}
