//! Single-table SELECT / COUNT statement assembly.

use super::options::SortSpec;
use super::predicate::Predicate;
use crate::model::field::{EntitySchema, FieldDef, PRIMARY_KEY};
use rusqlite::types::Value as SqlValue;

/// Row ordering applied when a statement has no explicit sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Order {
    /// Whatever order the store yields (`rowid` for SQLite tables).
    Storage,
    PrimaryKey,
    Field(SortSpec),
}

#[derive(Debug)]
pub(crate) struct Select<'s> {
    schema: &'s EntitySchema,
    columns: Vec<&'s FieldDef>,
    predicate: Option<Predicate>,
    order: Order,
    limit: Option<u32>,
    offset: u32,
}

impl<'s> Select<'s> {
    pub(crate) fn new(schema: &'s EntitySchema) -> Self {
        Self {
            schema,
            columns: schema.fields().iter().collect(),
            predicate: None,
            order: Order::Storage,
            limit: None,
            offset: 0,
        }
    }

    /// Restricts the selected columns, keeping declaration order.
    pub(crate) fn project(mut self, fields: Option<&[String]>) -> Self {
        if let Some(fields) = fields {
            self.columns = self
                .schema
                .fields()
                .iter()
                .filter(|field| fields.iter().any(|wanted| wanted == field.name()))
                .collect();
        }
        self
    }

    pub(crate) fn filter(mut self, predicate: Option<Predicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub(crate) fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub(crate) fn page(mut self, limit: Option<u32>, offset: u32) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub(crate) fn columns(&self) -> &[&'s FieldDef] {
        &self.columns
    }

    pub(crate) fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let mut binds = Vec::new();
        let columns = self
            .columns
            .iter()
            .map(|field| format!("\"{}\"", field.name()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {columns} FROM \"{}\"", self.schema.table());

        if let Some(predicate) = self.predicate.as_ref() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate.to_sql(&mut binds));
        }

        match &self.order {
            Order::Storage => {}
            Order::PrimaryKey => sql.push_str(&format!(" ORDER BY \"{PRIMARY_KEY}\" ASC")),
            Order::Field(spec) => {
                sql.push_str(&format!(
                    " ORDER BY \"{}\" {}",
                    spec.field,
                    spec.direction.sql()
                ));
                if spec.field != PRIMARY_KEY {
                    // Tie-break so pagination over equal sort keys is stable.
                    sql.push_str(&format!(", \"{PRIMARY_KEY}\" ASC"));
                }
            }
        }

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            binds.push(SqlValue::Integer(i64::from(limit)));
            if self.offset > 0 {
                sql.push_str(" OFFSET ?");
                binds.push(SqlValue::Integer(i64::from(self.offset)));
            }
        } else if self.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            binds.push(SqlValue::Integer(i64::from(self.offset)));
        }

        (sql, binds)
    }

    pub(crate) fn to_count_sql(&self) -> (String, Vec<SqlValue>) {
        let mut binds = Vec::new();
        let mut sql = format!("SELECT COUNT(*) FROM \"{}\"", self.schema.table());
        if let Some(predicate) = self.predicate.as_ref() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate.to_sql(&mut binds));
        }
        (sql, binds)
    }
}
