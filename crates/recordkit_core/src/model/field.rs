//! Entity metadata: declared fields and their storage kinds.
//!
//! # Responsibility
//! - Describe each entity type as an ordered list of typed fields.
//! - Reject metadata that cannot be safely rendered into SQL identifiers.
//!
//! # Invariants
//! - The primary key `id` (required text) is always the first field.
//! - Field names are unique and match `^[A-Za-z_][A-Za-z0-9_]*$`.
//! - A schema is immutable once built.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Name of the implicit primary-key column present on every entity.
pub const PRIMARY_KEY: &str = "id";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Closed set of storage kinds a field can declare.
///
/// Predicate construction matches over this enum instead of inspecting
/// values at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Boolean,
    /// Calendar date, stored as `YYYY-MM-DD`.
    Date,
    /// Naive timestamp, stored as `YYYY-MM-DD HH:MM:SS[.fff]`.
    DateTime,
    /// UUID-shaped identifier, stored as lowercase hyphenated text.
    Identifier,
    /// JSON array of scalar values.
    List,
}

impl FieldKind {
    /// Returns the SQLite column type used for this kind.
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Text | Self::Date | Self::DateTime | Self::Identifier | Self::List => "TEXT",
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Float => "REAL",
        }
    }

    /// Whether the kind is a calendar or timestamp value.
    pub fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::DateTime)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Identifier => "identifier",
            Self::List => "list",
        }
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One declared field of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    name: String,
    kind: FieldKind,
    optional: bool,
    default_sql: Option<String>,
}

impl FieldDef {
    /// Declares a required field of the given kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
            default_sql: None,
        }
    }

    /// Marks the field as nullable.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Sets a SQL default expression applied when an insert omits the column.
    ///
    /// The expression is emitted verbatim into `CREATE TABLE`, e.g. `'active'`
    /// or `CURRENT_TIMESTAMP`.
    pub fn default_sql(mut self, expression: impl Into<String>) -> Self {
        self.default_sql = Some(expression.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn default_expression(&self) -> Option<&str> {
        self.default_sql.as_deref()
    }

    pub fn is_primary_key(&self) -> bool {
        self.name == PRIMARY_KEY
    }

    /// Renders the column clause used by `CREATE TABLE` / `ADD COLUMN`.
    pub(crate) fn column_sql(&self) -> String {
        let mut sql = format!("\"{}\" {}", self.name, self.kind.sql_type());
        if self.is_primary_key() {
            sql.push_str(" PRIMARY KEY NOT NULL");
        } else if !self.optional {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = self.default_sql.as_deref() {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

/// Error raised while declaring entity metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    InvalidIdentifier(String),
    DuplicateField { table: String, field: String },
    ReservedField { table: String, field: String },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier(name) => {
                write!(f, "`{name}` is not a valid table or field identifier")
            }
            Self::DuplicateField { table, field } => {
                write!(f, "field `{field}` is declared twice on `{table}`")
            }
            Self::ReservedField { table, field } => write!(
                f,
                "field `{field}` on `{table}` is reserved for the primary key"
            ),
        }
    }
}

impl Error for SchemaError {}

/// Immutable metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    table: String,
    fields: Vec<FieldDef>,
}

impl EntitySchema {
    /// Builds metadata for `table` with the implicit `id` primary key prepended.
    ///
    /// # Errors
    /// - `InvalidIdentifier` when the table or a field name is not a plain SQL identifier.
    /// - `ReservedField` when a field is named `id`.
    /// - `DuplicateField` when two fields share a name.
    pub fn new(
        table: impl Into<String>,
        fields: impl IntoIterator<Item = FieldDef>,
    ) -> Result<Self, SchemaError> {
        let table = table.into();
        ensure_identifier(&table)?;

        let mut all = vec![FieldDef::new(PRIMARY_KEY, FieldKind::Text)];
        for field in fields {
            ensure_identifier(field.name())?;
            if field.is_primary_key() {
                return Err(SchemaError::ReservedField {
                    table,
                    field: field.name,
                });
            }
            if all.iter().any(|existing| existing.name == field.name) {
                return Err(SchemaError::DuplicateField {
                    table,
                    field: field.name,
                });
            }
            all.push(field);
        }

        Ok(Self { table, fields: all })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// All fields in declaration order, starting with `id`.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(FieldDef::name).collect()
    }

    /// Fields searched by free-text search.
    pub fn text_fields(&self) -> Vec<&FieldDef> {
        self.fields
            .iter()
            .filter(|field| field.kind == FieldKind::Text)
            .collect()
    }

    pub(crate) fn create_table_sql(&self) -> String {
        let columns = self
            .fields
            .iter()
            .map(FieldDef::column_sql)
            .collect::<Vec<_>>()
            .join(",\n    ");
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n    {}\n);",
            self.table, columns
        )
    }
}

fn ensure_identifier(name: &str) -> Result<(), SchemaError> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}
