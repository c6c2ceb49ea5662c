//! CRUD operations for one entity type.
//!
//! # Responsibility
//! - Point lookups, saves and deletes keyed by the string primary key.
//! - Shared row plumbing (select execution, decoding, insert/update) used by
//!   the filter and bulk operations.
//!
//! # Invariants
//! - Writes go through `prepare_write_row`, so only declared fields with
//!   kind-compatible values reach SQL.
//! - Returned records are detached snapshots; nothing tracks them afterwards.

use super::{RepoError, RepoResult, ValidationError};
use crate::db::{Engine, SessionMode};
use crate::model::entity::Entity;
use crate::model::field::{EntitySchema, FieldDef, FieldKind, PRIMARY_KEY};
use crate::model::value::{Row, Value};
use crate::query::options::ListOptions;
use crate::query::predicate::{coerce, Predicate};
use crate::query::select::{Order, Select};
use log::debug;
use rusqlite::{params_from_iter, Connection};
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::time::Instant;

/// Repository for entity type `E` bound to one engine.
///
/// Holds no connection: each call opens and finishes its own session.
pub struct Repository<'e, E: Entity> {
    engine: &'e Engine,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: Entity> Copy for Repository<'_, E> {}

impl<E: Entity> Debug for Repository<'_, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &E::schema().table())
            .field("engine", self.engine)
            .finish()
    }
}

impl<'e, E: Entity> Repository<'e, E> {
    /// Binds `E` to `engine` and registers its schema for `init_db`.
    pub fn new(engine: &'e Engine) -> Self {
        engine.register(E::schema());
        Self {
            engine,
            _entity: PhantomData,
        }
    }

    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    pub fn schema(&self) -> &'static EntitySchema {
        E::schema()
    }

    /// Creates tables for every entity registered with the engine.
    pub fn init_db(&self) -> RepoResult<()> {
        self.engine.init_db()?;
        Ok(())
    }

    /// Point lookup by primary key.
    pub fn find(&self, id: &str) -> RepoResult<Option<E>> {
        let started_at = Instant::now();
        let session = self.engine.session(SessionMode::Read)?;
        let found = fetch_by_id(&session, self.schema(), id)?;
        session.commit()?;

        let record = found.map(E::from_row).transpose()?;
        self.log_op("find", usize::from(record.is_some()), started_at);
        Ok(record)
    }

    /// First record (by `id`) whose fields equal every given value.
    ///
    /// `Value::Null` matches `IS NULL`. Text values are parsed for
    /// identifier and temporal fields exactly like `filter` does.
    ///
    /// # Errors
    /// - `ValidationError::UnknownFields` for undeclared criteria names.
    /// - `ParseError` for malformed identifier or temporal text.
    pub fn find_by<K, V>(&self, criteria: impl IntoIterator<Item = (K, V)>) -> RepoResult<Option<E>>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let started_at = Instant::now();
        let schema = self.schema();
        let criteria = criteria
            .into_iter()
            .map(|(field, value)| (field.as_ref().to_string(), value.into()))
            .collect::<Vec<_>>();
        validate_fields(schema, criteria.iter().map(|(field, _)| field.as_str()))?;

        let mut predicates = Vec::with_capacity(criteria.len());
        for (field, value) in criteria {
            let def = schema
                .field(&field)
                .ok_or_else(|| unknown_fields(schema, vec![field.clone()]))?;
            predicates.push(Predicate::Equals {
                value: coerce(def, value)?,
                field,
            });
        }

        let select = Select::new(schema)
            .filter(Some(Predicate::AllOf(predicates)))
            .order(Order::PrimaryKey)
            .page(Some(1), 0);
        let session = self.engine.session(SessionMode::Read)?;
        let found = run_select(&session, &select)?;
        session.commit()?;

        let record = found.into_iter().next().map(E::from_row).transpose()?;
        self.log_op("find_by", usize::from(record.is_some()), started_at);
        Ok(record)
    }

    pub fn exists(&self, id: &str) -> RepoResult<bool> {
        let session = self.engine.session(SessionMode::Read)?;
        let exists = row_exists(&session, self.schema(), id)?;
        session.commit()?;
        Ok(exists)
    }

    /// Inserts `record`, or overwrites every field of the stored record
    /// with the same id.
    ///
    /// The existence check and the write share one `IMMEDIATE` transaction.
    /// Returns `true` when a new row was inserted.
    ///
    /// # Errors
    /// - `ValidationError::MissingId` when the record id is blank.
    /// - `ValidationError::UnknownFields` when `to_row` emits undeclared fields.
    /// - `RepoError::InvalidData` when a value does not fit its field kind.
    pub fn save(&self, record: &E) -> RepoResult<bool> {
        let started_at = Instant::now();
        let schema = self.schema();
        let mut row = record.to_row();
        row.insert(PRIMARY_KEY, record.id());
        let row = prepare_write_row(schema, row, WriteKind::Overwrite)?;
        let id = row_id(schema, &row)?.ok_or_else(|| ValidationError::MissingId {
            entity: schema.table().to_string(),
        })?;

        let session = self.engine.session(SessionMode::Write)?;
        let inserted = if row_exists(&session, schema, &id)? {
            update_row(&session, schema, &row)?;
            false
        } else {
            insert_row(&session, schema, &row)?;
            true
        };
        session.commit()?;

        debug!(
            "event=repo_op module=repo entity={} op=save status=ok inserted={} duration_ms={}",
            schema.table(),
            inserted,
            started_at.elapsed().as_millis()
        );
        Ok(inserted)
    }

    /// Removes the stored counterpart of `record`; a missing row is a no-op.
    pub fn delete(&self, record: &E) -> RepoResult<()> {
        self.delete_by_id(record.id())?;
        Ok(())
    }

    /// Removes the row with `id`, returning whether one existed.
    pub fn delete_by_id(&self, id: &str) -> RepoResult<bool> {
        let started_at = Instant::now();
        let session = self.engine.session(SessionMode::Write)?;
        let changed = session.execute(
            &format!(
                "DELETE FROM \"{}\" WHERE \"{PRIMARY_KEY}\" = ?1;",
                self.schema().table()
            ),
            [id],
        )?;
        session.commit()?;

        self.log_op("delete", changed, started_at);
        Ok(changed > 0)
    }

    /// Every record, in store order.
    pub fn all(&self) -> RepoResult<Vec<E>> {
        let started_at = Instant::now();
        let select = Select::new(self.schema());
        let records = self.load(&select)?;
        self.log_op("all", records.len(), started_at);
        Ok(records)
    }

    /// Records matching every predicate (AND), with optional sort and paging.
    ///
    /// Predicates are taken as built; only the fields they name are checked.
    /// `Predicate::Raw` fragments are passed through unvalidated.
    pub fn find_where(&self, predicates: &[Predicate], options: &ListOptions) -> RepoResult<Vec<E>> {
        let started_at = Instant::now();
        let schema = self.schema();
        validate_fields(schema, predicates.iter().flat_map(Predicate::fields))?;
        let order = validate_options(schema, options, Order::Storage)?;

        let predicate = (!predicates.is_empty()).then(|| Predicate::AllOf(predicates.to_vec()));
        let select = Select::new(schema)
            .filter(predicate)
            .order(order)
            .page(options.limit, options.offset);
        let records = self.load(&select)?;
        self.log_op("find_where", records.len(), started_at);
        Ok(records)
    }

    /// Total number of stored records.
    pub fn count(&self) -> RepoResult<u64> {
        let started_at = Instant::now();
        let count = self.count_select(&Select::new(self.schema()))?;
        self.log_op("count", 1, started_at);
        Ok(count)
    }

    pub(super) fn load(&self, select: &Select<'_>) -> RepoResult<Vec<E>> {
        let session = self.engine.session(SessionMode::Read)?;
        let rows = run_select(&session, select)?;
        session.commit()?;
        rows.into_iter().map(E::from_row).collect()
    }

    pub(super) fn load_rows(&self, select: &Select<'_>) -> RepoResult<Vec<Row>> {
        let session = self.engine.session(SessionMode::Read)?;
        let rows = run_select(&session, select)?;
        session.commit()?;
        Ok(rows)
    }

    pub(super) fn count_select(&self, select: &Select<'_>) -> RepoResult<u64> {
        let (sql, binds) = select.to_count_sql();
        let session = self.engine.session(SessionMode::Read)?;
        let count: i64 = session.query_row(&sql, params_from_iter(binds.iter()), |row| row.get(0))?;
        session.commit()?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    pub(super) fn log_op(&self, op: &str, rows: usize, started_at: Instant) {
        debug!(
            "event=repo_op module=repo entity={} op={} status=ok rows={} duration_ms={}",
            self.schema().table(),
            op,
            rows,
            started_at.elapsed().as_millis()
        );
    }
}

pub(super) fn unknown_fields(schema: &EntitySchema, fields: Vec<String>) -> ValidationError {
    ValidationError::UnknownFields {
        entity: schema.table().to_string(),
        fields,
    }
}

/// Fails with every undeclared name, in first-seen order.
pub(super) fn validate_fields<'a>(
    schema: &EntitySchema,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), ValidationError> {
    let mut unknown: Vec<String> = Vec::new();
    for name in names {
        if !schema.has_field(name) && !unknown.iter().any(|seen| seen == name) {
            unknown.push(name.to_string());
        }
    }
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(unknown_fields(schema, unknown))
    }
}

/// Checks sort and projection names; returns the effective ordering.
pub(super) fn validate_options(
    schema: &EntitySchema,
    options: &ListOptions,
    default_order: Order,
) -> Result<Order, ValidationError> {
    if let Some(fields) = options.fields.as_deref() {
        validate_fields(schema, fields.iter().map(String::as_str))?;
    }
    match options.sort.as_ref() {
        Some(spec) if !schema.has_field(&spec.field) => Err(ValidationError::UnknownSortField {
            entity: schema.table().to_string(),
            field: spec.field.clone(),
        }),
        Some(spec) => Ok(Order::Field(spec.clone())),
        None => Ok(default_order),
    }
}

pub(super) fn run_select(conn: &Connection, select: &Select<'_>) -> RepoResult<Vec<Row>> {
    let (sql, binds) = select.to_sql();
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(binds.iter()))?;

    let mut decoded = Vec::new();
    while let Some(row) = rows.next()? {
        decoded.push(decode_row(row, select.columns())?);
    }
    Ok(decoded)
}

fn decode_row(row: &rusqlite::Row<'_>, columns: &[&FieldDef]) -> RepoResult<Row> {
    let mut decoded = Row::new();
    for (index, field) in columns.iter().enumerate() {
        let value = Value::from_sql(field.kind(), row.get_ref(index)?).map_err(|message| {
            RepoError::InvalidData(format!("field `{}`: {message}", field.name()))
        })?;
        decoded.insert(field.name(), value);
    }
    Ok(decoded)
}

pub(super) fn fetch_by_id(
    conn: &Connection,
    schema: &EntitySchema,
    id: &str,
) -> RepoResult<Option<Row>> {
    let select = Select::new(schema)
        .filter(Some(Predicate::eq(PRIMARY_KEY, id)))
        .page(Some(1), 0);
    Ok(run_select(conn, &select)?.into_iter().next())
}

pub(super) fn row_exists(conn: &Connection, schema: &EntitySchema, id: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!(
        "SELECT 1 FROM \"{}\" WHERE \"{PRIMARY_KEY}\" = ?1 LIMIT 1;",
        schema.table()
    ))?;
    Ok(stmt.exists([id])?)
}

/// Inserts only the columns present in `row`, so declared defaults apply
/// to the rest.
pub(super) fn insert_row(conn: &Connection, schema: &EntitySchema, row: &Row) -> RepoResult<()> {
    let columns = row
        .keys()
        .map(|name| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; row.len()].join(", ");
    let binds = row.iter().map(|(_, value)| value.to_sql()).collect::<Vec<_>>();

    conn.execute(
        &format!(
            "INSERT INTO \"{}\" ({columns}) VALUES ({placeholders});",
            schema.table()
        ),
        params_from_iter(binds.iter()),
    )?;
    Ok(())
}

/// Overwrites every non-key column present in `row`.
pub(super) fn update_row(conn: &Connection, schema: &EntitySchema, row: &Row) -> RepoResult<usize> {
    let id = row
        .get(PRIMARY_KEY)
        .and_then(Value::as_text)
        .ok_or_else(|| ValidationError::MissingId {
            entity: schema.table().to_string(),
        })?;

    let mut assignments = Vec::with_capacity(row.len());
    let mut binds = Vec::with_capacity(row.len());
    for (name, value) in row.iter().filter(|(name, _)| name.as_str() != PRIMARY_KEY) {
        assignments.push(format!("\"{name}\" = ?"));
        binds.push(value.to_sql());
    }
    if assignments.is_empty() {
        return Ok(0);
    }
    binds.push(rusqlite::types::Value::Text(id.to_string()));

    let changed = conn.execute(
        &format!(
            "UPDATE \"{}\" SET {} WHERE \"{PRIMARY_KEY}\" = ?;",
            schema.table(),
            assignments.join(", ")
        ),
        params_from_iter(binds.iter()),
    )?;
    Ok(changed)
}

/// How a prepared row reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum WriteKind {
    /// Always inserted; omitted columns take their declared defaults.
    Insert,
    /// May overwrite a stored row, where no default applies.
    Overwrite,
}

/// Validates keys and coerces every value to its field's storage kind.
///
/// For `WriteKind::Insert`, an explicit null on a required field with a
/// declared default is dropped so the store applies the default.
///
/// # Errors
/// - `ValidationError::UnknownFields` listing every undeclared key.
/// - `ParseError` for malformed identifier or temporal text.
/// - `RepoError::InvalidData` when a value cannot be stored in its field,
///   including null on a required field that the write cannot default.
pub(super) fn prepare_write_row(
    schema: &EntitySchema,
    row: Row,
    kind: WriteKind,
) -> RepoResult<Row> {
    validate_fields(schema, row.keys())?;

    let mut prepared = Row::new();
    for (name, value) in row {
        let Some(field) = schema.field(&name) else {
            return Err(unknown_fields(schema, vec![name]).into());
        };
        let value = coerce(field, value)?;
        if value.is_null() && !field.is_optional() {
            if kind == WriteKind::Insert && field.default_expression().is_some() {
                continue;
            }
            return Err(RepoError::InvalidData(format!(
                "field `{name}` on `{}` is required",
                schema.table()
            )));
        }
        if !fits(field.kind(), &value) {
            return Err(RepoError::InvalidData(format!(
                "field `{name}`: expected {}, found {}",
                field.kind(),
                value.type_name()
            )));
        }
        prepared.insert(name, value);
    }
    Ok(prepared)
}

/// Primary key carried by `row`; `None` when absent, null or blank.
pub(super) fn row_id(schema: &EntitySchema, row: &Row) -> RepoResult<Option<String>> {
    match row.get(PRIMARY_KEY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(id)) if id.trim().is_empty() => Ok(None),
        Some(Value::Text(id)) => Ok(Some(id.clone())),
        Some(other) => Err(ValidationError::InvalidId {
            entity: schema.table().to_string(),
            found: other.type_name(),
        }
        .into()),
    }
}

fn fits(kind: FieldKind, value: &Value) -> bool {
    matches!(
        (kind, value),
        (_, Value::Null)
            | (FieldKind::Text, Value::Text(_))
            | (FieldKind::Integer, Value::Integer(_))
            | (FieldKind::Float, Value::Float(_))
            | (FieldKind::Boolean, Value::Boolean(_))
            | (FieldKind::Date, Value::Date(_))
            | (FieldKind::DateTime, Value::DateTime(_))
            | (FieldKind::Identifier, Value::Identifier(_))
            | (FieldKind::List, Value::List(_))
    )
}
