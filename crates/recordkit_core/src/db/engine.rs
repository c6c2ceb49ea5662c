//! Engine: the connection pool and the entity registry behind it.
//!
//! # Responsibility
//! - Build an `r2d2` pool of configured SQLite connections.
//! - Provide the lazily created, process-wide shared engine.
//! - Track which entity types are known, for `init_db`.
//!
//! # Invariants
//! - `shared_engine` returns the same instance for the process lifetime; the
//!   connection string is only consulted by the first successful call.
//! - A failed first construction leaves the shared slot empty so callers may retry.
//! - In-memory engines keep at least one connection open so the database
//!   survives between sessions.
//! - Every pooled connection of an in-memory engine sees the same database
//!   and waits on the busy timeout when another connection holds a lock.

use super::schema::{self, SchemaReport};
use super::session::{Session, SessionMode};
use super::{DbError, DbResult};
use crate::config::{ConnectionTarget, EngineConfig};
use crate::model::field::EntitySchema;
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use r2d2::{ManageConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

static SHARED_ENGINE: OnceCell<Engine> = OnceCell::new();
static MEMORY_DB_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Handle to one SQLite database and its connection pool.
pub struct Engine {
    pool: Pool<SqliteConnectionManager>,
    target: ConnectionTarget,
    config: EngineConfig,
    registry: Mutex<BTreeMap<String, &'static EntitySchema>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("target", &self.target)
            .field("max_connections", &self.config.max_connections)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Opens the store described by `config` and builds its pool.
    ///
    /// # Errors
    /// - `DbError::InvalidConnectionString` for malformed connection strings.
    /// - `DbError::Connection` when the store cannot be opened.
    /// - `DbError::Pool` when the pool cannot be established.
    ///
    /// # Side effects
    /// - Emits `engine_open` logging events with duration and status.
    pub fn connect(config: EngineConfig) -> DbResult<Self> {
        let started_at = Instant::now();
        let target = match config.target() {
            Ok(target) => target,
            Err(err) => {
                error!(
                    "event=engine_open module=db status=error error_code=invalid_connection_string error={}",
                    err
                );
                return Err(err);
            }
        };
        info!(
            "event=engine_open module=db status=start mode={}",
            target.mode()
        );

        let manager = connection_manager(&target, &config);

        // Probe once so an unreachable store fails now instead of after the
        // pool's checkout timeout. The probe also pins in-memory databases
        // until the pool holds its own connections.
        let probe = match manager.connect() {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=engine_open module=db status=error mode={} duration_ms={} error_code=store_unreachable error={}",
                    target.mode(),
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(DbError::Connection {
                    target: target.to_string(),
                    source: err,
                });
            }
        };

        let mut builder = Pool::builder()
            .max_size(config.max_connections.max(1))
            .connection_timeout(config.connection_timeout);
        if target == ConnectionTarget::Memory {
            builder = builder.idle_timeout(None).max_lifetime(None);
        }

        let pool = match builder.build(manager) {
            Ok(pool) => pool,
            Err(err) => {
                error!(
                    "event=engine_open module=db status=error mode={} duration_ms={} error_code=pool_build_failed error={}",
                    target.mode(),
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(DbError::Pool(err));
            }
        };
        drop(probe);

        info!(
            "event=engine_open module=db status=ok mode={} max_connections={} duration_ms={}",
            target.mode(),
            config.max_connections,
            started_at.elapsed().as_millis()
        );

        Ok(Self {
            pool,
            target,
            config,
            registry: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens a scoped session; see [`Session`].
    pub fn session(&self, mode: SessionMode) -> DbResult<Session> {
        let conn = self.pool.get()?;
        Session::begin(conn, mode)
    }

    /// Returns `(connections, idle_connections)` currently held by the pool.
    pub fn pool_state(&self) -> (u32, u32) {
        let state = self.pool.state();
        (state.connections, state.idle_connections)
    }

    /// Records an entity type as known to this engine.
    ///
    /// Registering the same table twice keeps the first schema.
    pub fn register(&self, schema: &'static EntitySchema) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        match registry.get(schema.table()) {
            Some(existing) if *existing != schema => warn!(
                "event=entity_register module=db status=conflict table={}",
                schema.table()
            ),
            Some(_) => {}
            None => {
                debug!(
                    "event=entity_register module=db status=ok table={}",
                    schema.table()
                );
                registry.insert(schema.table().to_string(), schema);
            }
        }
    }

    /// Schemas of every registered entity type, ordered by table name.
    pub fn registered(&self) -> Vec<&'static EntitySchema> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .copied()
            .collect()
    }

    /// Creates tables (and missing columns) for every registered entity.
    ///
    /// Idempotent: tables and columns that already exist are left untouched.
    pub fn init_db(&self) -> DbResult<()> {
        let started_at = Instant::now();
        let schemas = self.registered();
        let session = self.session(SessionMode::Write)?;
        for entity in &schemas {
            schema::ensure_table(&session, entity)?;
        }
        session.commit()?;
        info!(
            "event=init_db module=db status=ok tables={} duration_ms={}",
            schemas.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Introspects every table in the live store.
    pub fn schema(&self) -> DbResult<SchemaReport> {
        let session = self.session(SessionMode::Read)?;
        let report = schema::introspect(&session)?;
        session.commit()?;
        Ok(report)
    }
}

/// Returns the process-wide engine, creating it on first use.
///
/// The first successful call decides the connection string: the argument
/// when given, otherwise [`EngineConfig::from_env`]. Later calls return the
/// same engine and ignore their argument.
///
/// # Errors
/// - Propagates engine construction errors; the shared slot stays empty and
///   a later call retries.
pub fn shared_engine(connection_string: Option<&str>) -> DbResult<&'static Engine> {
    let engine = SHARED_ENGINE.get_or_try_init(|| {
        let config = match connection_string {
            Some(url) => EngineConfig::new(url),
            None => EngineConfig::from_env(),
        };
        Engine::connect(config)
    })?;

    if let Some(requested) = connection_string {
        if requested.trim() != engine.config.connection_string.trim() {
            warn!(
                "event=shared_engine module=db status=ignored reason=already_initialized mode={}",
                engine.target.mode()
            );
        }
    }

    Ok(engine)
}

fn connection_manager(target: &ConnectionTarget, config: &EngineConfig) -> SqliteConnectionManager {
    let busy_timeout = config.busy_timeout;
    match target {
        ConnectionTarget::Memory => {
            let seq = MEMORY_DB_SEQ.fetch_add(1, Ordering::Relaxed);
            // memdb locks like a file store: conflicts wait on the busy
            // timeout instead of failing with SQLITE_LOCKED.
            let uri = format!("file:/recordkit-mem-{}-{seq}?vfs=memdb", std::process::id());
            SqliteConnectionManager::file(uri)
                .with_flags(
                    OpenFlags::SQLITE_OPEN_READ_WRITE
                        | OpenFlags::SQLITE_OPEN_CREATE
                        | OpenFlags::SQLITE_OPEN_URI
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
                .with_init(move |conn| bootstrap_connection(conn, busy_timeout, "MEMORY"))
        }
        ConnectionTarget::File(path) => SqliteConnectionManager::file(path)
            .with_init(move |conn| bootstrap_connection(conn, busy_timeout, "WAL")),
    }
}

fn bootstrap_connection(
    conn: &mut Connection,
    busy_timeout: Duration,
    journal_mode: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    let _mode: String = conn.query_row(
        &format!("PRAGMA journal_mode = {journal_mode};"),
        [],
        |row| row.get(0),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Engine;
    use crate::config::EngineConfig;
    use crate::db::{DbError, SessionMode};

    #[test]
    fn memory_engine_shares_one_database_across_sessions() {
        let engine = Engine::connect(EngineConfig::new("sqlite::memory:").max_connections(2))
            .expect("memory engine should open");

        let session = engine.session(SessionMode::Write).unwrap();
        session
            .execute_batch("CREATE TABLE probe (id TEXT PRIMARY KEY NOT NULL);")
            .unwrap();
        session.commit().unwrap();

        let first = engine.session(SessionMode::Write).unwrap();
        first
            .execute("INSERT INTO probe (id) VALUES ('a');", [])
            .unwrap();
        first.commit().unwrap();

        let second = engine.session(SessionMode::Read).unwrap();
        let count: i64 = second
            .query_row("SELECT COUNT(*) FROM probe;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn separate_memory_engines_are_isolated() {
        let first = Engine::connect(EngineConfig::new(":memory:")).unwrap();
        let second = Engine::connect(EngineConfig::new(":memory:")).unwrap();

        let session = first.session(SessionMode::Write).unwrap();
        session
            .execute_batch("CREATE TABLE only_first (id TEXT);")
            .unwrap();
        session.commit().unwrap();

        let report = second.schema().unwrap();
        assert!(report.table("only_first").is_none());
    }

    #[test]
    fn malformed_connection_string_fails_without_connecting() {
        let err = Engine::connect(EngineConfig::new("mysql://localhost/app")).unwrap_err();
        assert!(matches!(err, DbError::InvalidConnectionString(_)));
        assert!(!err.is_unavailable());
    }

    #[test]
    fn dropped_session_rolls_back() {
        let engine = Engine::connect(EngineConfig::new("sqlite::memory:")).unwrap();
        let setup = engine.session(SessionMode::Write).unwrap();
        setup
            .execute_batch("CREATE TABLE probe (id TEXT PRIMARY KEY NOT NULL);")
            .unwrap();
        setup.commit().unwrap();

        {
            let session = engine.session(SessionMode::Write).unwrap();
            session
                .execute("INSERT INTO probe (id) VALUES ('lost');", [])
                .unwrap();
        }

        let check = engine.session(SessionMode::Read).unwrap();
        let count: i64 = check
            .query_row("SELECT COUNT(*) FROM probe;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
