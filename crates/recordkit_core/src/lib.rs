//! Generic entity persistence over SQLite.
//!
//! Declare an entity once as an [`EntitySchema`], implement [`Entity`] for the
//! record type, then use [`Repository`] for CRUD, type-aware filtering,
//! free-text search and bulk writes. Every repository call runs in its own
//! short-lived session on a shared, pooled [`Engine`].

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;

pub use config::{ConnectionTarget, EngineConfig};
pub use db::{shared_engine, DbError, DbResult, Engine, SchemaReport, Session, SessionMode};
pub use logging::{default_log_level, init_logging, logging_status, LogDestination};
pub use model::entity::Entity;
pub use model::field::{EntitySchema, FieldDef, FieldKind, SchemaError, PRIMARY_KEY};
pub use model::value::{FromValue, Row, Value};
pub use query::{Comparison, FilterQuery, ListOptions, Predicate, SearchQuery, SortDirection};
pub use repo::{
    get_repository, ParseError, RepoError, RepoResult, Repository, UpsertPolicy, ValidationError,
};

/// Minimal health-check API for smoke tests.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
