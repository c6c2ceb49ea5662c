//! Engine configuration and connection-string parsing.
//!
//! # Responsibility
//! - Hold the knobs used to build the process-wide connection pool.
//! - Classify connection strings into in-memory or file targets.
//!
//! # Invariants
//! - Environment variables are read only when `EngineConfig::from_env` is called.
//! - Unknown URL schemes are rejected instead of being treated as paths.

use crate::db::{DbError, DbResult};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the default connection string.
pub const DATABASE_URL_ENV: &str = "RECORDKIT_DATABASE_URL";
/// Environment variable overriding the pool size.
pub const POOL_SIZE_ENV: &str = "RECORDKIT_POOL_SIZE";
/// Connection string used when nothing is configured.
pub const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";

const DEFAULT_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for building an [`crate::db::Engine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub connection_string: String,
    /// Upper bound of pooled connections.
    pub max_connections: u32,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
    /// How long a session waits to check out a pooled connection.
    pub connection_timeout: Duration,
}

impl EngineConfig {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }

    /// Reads `RECORDKIT_DATABASE_URL` and `RECORDKIT_POOL_SIZE`.
    ///
    /// Missing or unparsable values fall back to defaults.
    pub fn from_env() -> Self {
        let url = std::env::var(DATABASE_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let mut config = Self::new(url);
        if let Some(size) = std::env::var(POOL_SIZE_ENV)
            .ok()
            .and_then(|value| value.trim().parse::<u32>().ok())
            .filter(|size| *size > 0)
        {
            config.max_connections = size;
        }
        config
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn target(&self) -> DbResult<ConnectionTarget> {
        ConnectionTarget::parse(&self.connection_string)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASE_URL)
    }
}

/// Where a connection string points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Memory,
    File(PathBuf),
}

impl ConnectionTarget {
    /// Parses `sqlite::memory:`, `:memory:`, `sqlite://<path>`,
    /// `sqlite:<path>` or a bare filesystem path.
    ///
    /// # Errors
    /// - `DbError::InvalidConnectionString` for empty input, an empty path, or
    ///   any other `scheme://` prefix.
    pub fn parse(connection_string: &str) -> DbResult<Self> {
        let trimmed = connection_string.trim();
        if trimmed.is_empty() {
            return Err(DbError::InvalidConnectionString(
                "connection string cannot be empty".to_string(),
            ));
        }

        let location = if let Some(rest) = trimmed.strip_prefix("sqlite://") {
            rest
        } else if let Some(rest) = trimmed.strip_prefix("sqlite:") {
            rest
        } else if trimmed.contains("://") {
            return Err(DbError::InvalidConnectionString(format!(
                "unsupported connection string `{trimmed}`; expected sqlite:<path> or sqlite::memory:"
            )));
        } else {
            trimmed
        };

        let location = location.split('?').next().unwrap_or_default();
        match location {
            ":memory:" => Ok(Self::Memory),
            "" => Err(DbError::InvalidConnectionString(format!(
                "connection string `{trimmed}` has no database path"
            ))),
            path => Ok(Self::File(PathBuf::from(path))),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File(_) => "file",
        }
    }
}

impl Display for ConnectionTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => f.write_str(":memory:"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}
