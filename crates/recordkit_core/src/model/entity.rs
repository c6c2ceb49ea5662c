//! Entity contract implemented by every persisted record type.
//!
//! # Responsibility
//! - Bind a Rust record type to its immutable `EntitySchema`.
//! - Convert records to and from field-name keyed rows.
//!
//! # Invariants
//! - `to_row` emits every declared field, including `id`.
//! - `from_row` must accept any row produced by `to_row`.

use crate::model::field::EntitySchema;
use crate::model::value::Row;
use crate::repo::RepoResult;

/// A declaratively typed record kind with a string primary key.
///
/// Records are detached snapshots: mutate an instance and call
/// `Repository::save` again to persist changes.
pub trait Entity: Sized {
    /// Metadata built once per type, usually from a `Lazy` static.
    fn schema() -> &'static EntitySchema;

    /// Primary key value.
    fn id(&self) -> &str;

    fn to_row(&self) -> Row;

    fn from_row(row: Row) -> RepoResult<Self>;
}
