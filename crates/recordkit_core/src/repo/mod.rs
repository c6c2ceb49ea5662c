//! Generic entity repository over the shared engine.
//!
//! # Responsibility
//! - Expose CRUD, filter, search and bulk operations for any `Entity`.
//! - Translate storage and input problems into semantic error variants.
//!
//! # Invariants
//! - Every public operation opens exactly one session and finishes it
//!   before returning.
//! - Unknown field names fail with `ValidationError` before a session opens.
//! - A missing record is `Ok(None)`, never an error.

use crate::db::{shared_engine, DbError, DbResult};
use crate::model::entity::Entity;
use crate::model::field::FieldKind;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod bulk;
mod entity_repo;
mod filter;

pub use bulk::UpsertPolicy;
pub use entity_repo::Repository;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    Parse(ParseError),
    Db(DbError),
    /// Stored or entity-provided data does not match the declared schema.
    InvalidData(String),
}

impl RepoError {
    /// Whether the backing store was unreachable or busy.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_unavailable())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Parse(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid record data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ParseError> for RepoError {
    fn from(value: ParseError) -> Self {
        Self::Parse(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<r2d2::Error> for RepoError {
    fn from(value: r2d2::Error) -> Self {
        Self::Db(DbError::Pool(value))
    }
}

/// Caller input that names things the entity does not declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    UnknownFields { entity: String, fields: Vec<String> },
    UnknownSortField { entity: String, field: String },
    InvalidSortDirection(String),
    MissingId { entity: String },
    InvalidId { entity: String, found: &'static str },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownFields { entity, fields } => write!(
                f,
                "unknown field(s) for `{entity}`: {}",
                fields
                    .iter()
                    .map(|field| format!("`{field}`"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::UnknownSortField { entity, field } => {
                write!(f, "cannot sort `{entity}` by unknown field `{field}`")
            }
            Self::InvalidSortDirection(value) => {
                write!(f, "invalid sort direction `{value}`; expected asc|desc")
            }
            Self::MissingId { entity } => write!(f, "`{entity}` record has no `id`"),
            Self::InvalidId { entity, found } => {
                write!(f, "`{entity}` id must be text, found {found}")
            }
        }
    }
}

impl Error for ValidationError {}

/// Text input that could not be parsed into a field's declared kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub field: String,
    pub input: String,
    pub expected: FieldKind,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cannot parse `{}` as {} for field `{}`",
            self.input, self.expected, self.field
        )
    }
}

impl Error for ParseError {}

/// Returns the repository for `E` bound to the process-wide engine.
///
/// See [`shared_engine`] for how the connection string is chosen.
pub fn get_repository<E: Entity>(
    connection_string: Option<&str>,
) -> DbResult<Repository<'static, E>> {
    let engine = shared_engine(connection_string)?;
    Ok(Repository::new(engine))
}
