//! Additive table creation and live-schema introspection.
//!
//! # Responsibility
//! - Create entity tables if absent and add newly declared columns.
//! - Report tables, columns and primary keys of the live store.
//!
//! # Invariants
//! - Schema changes are additive only; nothing is dropped or altered in place.
//! - The report is diagnostic output and is not parsed by other components.

use super::DbResult;
use crate::model::field::{EntitySchema, FieldDef};
use log::{info, warn};
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnReport {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
    pub primary_key: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub name: String,
    pub columns: Vec<ColumnReport>,
}

impl TableReport {
    pub fn column(&self, name: &str) -> Option<&ColumnReport> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn primary_keys(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|column| column.primary_key)
            .map(|column| column.name.as_str())
            .collect()
    }
}

/// Human-readable description of every user table in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub tables: Vec<TableReport>,
}

impl SchemaReport {
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|table| table.name == name)
    }
}

impl Display for SchemaReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.tables.is_empty() {
            return writeln!(f, "(no tables)");
        }
        for table in &self.tables {
            writeln!(f, "Table: {}", table.name)?;
            for column in &table.columns {
                write!(f, "  - {} ({})", column.name, column.sql_type)?;
                if column.primary_key {
                    write!(f, " [PK]")?;
                }
                if column.not_null && !column.primary_key {
                    write!(f, " NOT NULL")?;
                }
                if let Some(default) = column.default.as_deref() {
                    write!(f, " DEFAULT {default}")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Creates the entity table if absent, then adds any declared column the
/// existing table lacks.
pub(crate) fn ensure_table(conn: &Connection, entity: &EntitySchema) -> DbResult<()> {
    conn.execute_batch(&entity.create_table_sql())?;

    let existing = column_names(conn, entity.table())?;
    for field in entity.fields() {
        if existing.contains(field.name()) || field.is_primary_key() {
            continue;
        }
        conn.execute_batch(&format!(
            "ALTER TABLE \"{}\" ADD COLUMN {};",
            entity.table(),
            add_column_sql(field)
        ))?;
        info!(
            "event=schema_add_column module=db status=ok table={} column={}",
            entity.table(),
            field.name()
        );
    }
    Ok(())
}

/// SQLite refuses `ADD COLUMN … NOT NULL` without a default, so such
/// columns are added as nullable.
fn add_column_sql(field: &FieldDef) -> String {
    if field.is_optional() || field.default_expression().is_some() {
        return field.column_sql();
    }
    warn!(
        "event=schema_add_column module=db status=relaxed column={} reason=not_null_without_default",
        field.name()
    );
    format!("\"{}\" {}", field.name(), field.kind().sql_type())
}

fn column_names(conn: &Connection, table: &str) -> DbResult<BTreeSet<String>> {
    Ok(table_columns(conn, table)?
        .into_iter()
        .map(|column| column.name)
        .collect())
}

fn table_columns(conn: &Connection, table: &str) -> DbResult<Vec<ColumnReport>> {
    let mut stmt = conn.prepare("SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1);")?;
    let mut rows = stmt.query([table])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(ColumnReport {
            name: row.get(0)?,
            sql_type: row.get(1)?,
            not_null: row.get::<_, i64>(2)? != 0,
            default: row.get(3)?,
            primary_key: row.get::<_, i64>(4)? != 0,
        });
    }
    Ok(columns)
}

/// Reads every non-internal table and its columns.
pub(crate) fn introspect(conn: &Connection) -> DbResult<SchemaReport> {
    let mut stmt = conn.prepare(
        "SELECT name
         FROM sqlite_master
         WHERE type = 'table'
           AND name NOT LIKE 'sqlite_%'
         ORDER BY name ASC;",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let columns = table_columns(conn, &name)?;
        tables.push(TableReport { name, columns });
    }
    Ok(SchemaReport { tables })
}

#[cfg(test)]
mod tests {
    use super::{ensure_table, introspect};
    use crate::model::field::{EntitySchema, FieldDef, FieldKind};
    use rusqlite::Connection;

    fn schema_v1() -> EntitySchema {
        EntitySchema::new("books", [FieldDef::new("title", FieldKind::Text)]).unwrap()
    }

    fn schema_v2() -> EntitySchema {
        EntitySchema::new(
            "books",
            [
                FieldDef::new("title", FieldKind::Text),
                FieldDef::new("pages", FieldKind::Integer),
                FieldDef::new("genre", FieldKind::Text).default_sql("'unknown'"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn ensure_table_is_idempotent_and_additive() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_table(&conn, &schema_v1()).unwrap();
        ensure_table(&conn, &schema_v1()).unwrap();
        conn.execute("INSERT INTO books (id, title) VALUES ('b1', 'Dune');", [])
            .unwrap();

        ensure_table(&conn, &schema_v2()).unwrap();

        let report = introspect(&conn).unwrap();
        let books = report.table("books").expect("books table should exist");
        assert_eq!(books.primary_keys(), vec!["id"]);
        assert!(books.column("pages").is_some());
        assert_eq!(
            books.column("genre").and_then(|c| c.default.as_deref()),
            Some("'unknown'")
        );

        let genre: String = conn
            .query_row("SELECT genre FROM books WHERE id = 'b1';", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(genre, "unknown");
    }

    #[test]
    fn report_renders_tables_and_primary_keys() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_table(&conn, &schema_v2()).unwrap();

        let rendered = introspect(&conn).unwrap().to_string();
        assert!(rendered.contains("Table: books"));
        assert!(rendered.contains("  - id (TEXT) [PK]"));
        assert!(rendered.contains("  - pages (INTEGER) NOT NULL"));
    }

    #[test]
    fn empty_store_reports_no_tables() {
        let conn = Connection::open_in_memory().unwrap();
        let report = introspect(&conn).unwrap();
        assert!(report.tables.is_empty());
        assert_eq!(report.to_string(), "(no tables)\n");
    }
}
