//! Batched multi-record writes in one session.
//!
//! # Responsibility
//! - Insert many field mappings at once and return the stored records.
//! - Update existing records from partial mappings, optionally inserting
//!   unknown ids.
//!
//! # Invariants
//! - Every mapping is validated and coerced before the session opens; one bad
//!   entry rejects the whole batch.
//! - All writes of a batch commit together or not at all.

use super::entity_repo::{
    fetch_by_id, insert_row, prepare_write_row, row_exists, row_id, update_row, Repository,
    WriteKind,
};
use super::RepoResult;
use crate::db::SessionMode;
use crate::model::entity::Entity;
use crate::model::field::{EntitySchema, PRIMARY_KEY};
use crate::model::value::Row;
use log::{debug, warn};
use rusqlite::Connection;
use std::time::Instant;
use uuid::Uuid;

/// What `bulk_upsert_with` does with entries whose id is not stored yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpsertPolicy {
    /// Update known ids only; entries without a stored id are dropped and
    /// logged at `warn`.
    #[default]
    UpdateExisting,
    /// Insert entries whose id is unknown or missing.
    InsertMissing,
}

impl UpsertPolicy {
    fn name(self) -> &'static str {
        match self {
            Self::UpdateExisting => "update_existing",
            Self::InsertMissing => "insert_missing",
        }
    }
}

impl<E: Entity> Repository<'_, E> {
    /// Inserts every mapping and returns the stored records in input order.
    ///
    /// Mappings may omit fields that have a declared default, or set them to
    /// null; the returned records carry the defaults applied by the store. A
    /// missing `id` is replaced with a generated UUID v4.
    ///
    /// # Errors
    /// - `ValidationError::UnknownFields` for undeclared keys.
    /// - `ParseError` / `RepoError::InvalidData` for values that do not fit.
    /// - `RepoError::Db` on constraint violations such as duplicate ids; the
    ///   batch is rolled back.
    pub fn bulk_create(&self, rows: Vec<Row>) -> RepoResult<Vec<E>> {
        let started_at = Instant::now();
        let schema = self.schema();
        let mut prepared = Vec::with_capacity(rows.len());
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let (id, row) = with_id(schema, prepare_write_row(schema, row, WriteKind::Insert)?)?;
            ids.push(id);
            prepared.push(row);
        }

        let session = self.engine().session(SessionMode::Write)?;
        for row in &prepared {
            insert_row(&session, schema, row)?;
        }
        let stored = read_back(&session, schema, &ids)?;
        session.commit()?;

        self.log_op("bulk_create", stored.len(), started_at);
        stored.into_iter().map(E::from_row).collect()
    }

    /// Updates stored records from partial mappings.
    ///
    /// Equivalent to `bulk_upsert_with(rows, UpsertPolicy::UpdateExisting)`:
    /// provided keys overwrite the stored values, while entries without an
    /// `id` or with an id that is not stored are dropped, so they are neither
    /// inserted nor returned.
    pub fn bulk_upsert(&self, rows: Vec<Row>) -> RepoResult<Vec<E>> {
        self.bulk_upsert_with(rows, UpsertPolicy::UpdateExisting)
    }

    /// Updates known ids and, under `UpsertPolicy::InsertMissing`, inserts
    /// the rest. Returns the written records in input order.
    ///
    /// # Errors
    /// - `RepoError::InvalidData` for null on a required field, even one
    ///   with a declared default.
    pub fn bulk_upsert_with(&self, rows: Vec<Row>, policy: UpsertPolicy) -> RepoResult<Vec<E>> {
        let started_at = Instant::now();
        let schema = self.schema();
        let mut prepared = Vec::with_capacity(rows.len());
        for row in rows {
            let row = prepare_write_row(schema, row, WriteKind::Overwrite)?;
            let id = row_id(schema, &row)?;
            prepared.push((id, row));
        }

        let session = self.engine().session(SessionMode::Write)?;
        let mut written = Vec::with_capacity(prepared.len());
        let mut dropped = 0usize;
        for (id, row) in prepared {
            match (id, policy) {
                (Some(id), _) if row_exists(&session, schema, &id)? => {
                    update_row(&session, schema, &row)?;
                    written.push(id);
                }
                (id, UpsertPolicy::InsertMissing) => {
                    let (id, row) = match id {
                        Some(id) => (id, row),
                        None => with_id(schema, row)?,
                    };
                    insert_row(&session, schema, &row)?;
                    written.push(id);
                }
                (id, UpsertPolicy::UpdateExisting) => {
                    dropped += 1;
                    warn!(
                        "event=bulk_upsert module=repo status=dropped entity={} id={} reason={}",
                        schema.table(),
                        id.as_deref().unwrap_or("-"),
                        if id.is_some() { "unknown_id" } else { "missing_id" }
                    );
                }
            }
        }
        let stored = read_back(&session, schema, &written)?;
        session.commit()?;

        debug!(
            "event=repo_op module=repo entity={} op=bulk_upsert status=ok policy={} rows={} dropped={} duration_ms={}",
            schema.table(),
            policy.name(),
            stored.len(),
            dropped,
            started_at.elapsed().as_millis()
        );
        stored.into_iter().map(E::from_row).collect()
    }
}

/// Ensures `row` carries an id, generating one when absent.
fn with_id(schema: &EntitySchema, mut row: Row) -> RepoResult<(String, Row)> {
    let id = match row_id(schema, &row)? {
        Some(id) => id,
        None => {
            let generated = Uuid::new_v4().to_string();
            row.insert(PRIMARY_KEY, generated.as_str());
            generated
        }
    };
    Ok((id, row))
}

fn read_back(conn: &Connection, schema: &EntitySchema, ids: &[String]) -> RepoResult<Vec<Row>> {
    let mut stored = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(row) = fetch_by_id(conn, schema, id)? {
            stored.push(row);
        }
    }
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::{with_id, UpsertPolicy};
    use crate::model::field::{EntitySchema, FieldDef, FieldKind};
    use crate::model::value::Row;
    use uuid::Uuid;

    #[test]
    fn default_policy_only_updates_existing() {
        assert_eq!(UpsertPolicy::default(), UpsertPolicy::UpdateExisting);
    }

    #[test]
    fn with_id_generates_uuid_for_missing_or_blank_ids() {
        let schema = EntitySchema::new("notes", [FieldDef::new("body", FieldKind::Text)]).unwrap();

        let (kept, _) = with_id(&schema, Row::new().with("id", "n-1")).unwrap();
        assert_eq!(kept, "n-1");

        let (generated, row) = with_id(&schema, Row::new().with("id", " ")).unwrap();
        assert!(Uuid::parse_str(&generated).is_ok());
        assert_eq!(row.get("id").and_then(|value| value.as_text()), Some(generated.as_str()));
    }
}
