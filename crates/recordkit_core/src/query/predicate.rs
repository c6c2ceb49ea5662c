//! Typed predicates and the field-kind driven resolver that builds them.
//!
//! # Responsibility
//! - Represent single comparisons (equality, range, substring, membership)
//!   and their AND/OR composition.
//! - Turn a caller's `field = value` pair into the right comparison for the
//!   field's declared kind.
//! - Render predicates to parameterized SQL.
//!
//! # Invariants
//! - Field names are quoted identifiers; values are always bound, never inlined.
//! - Malformed identifier or temporal input fails before any SQL is produced.

use crate::model::field::{EntitySchema, FieldDef, FieldKind};
use crate::model::value::{parse_date, parse_datetime, Value};
use crate::repo::{ParseError, RepoResult, ValidationError};
use rusqlite::types::Value as SqlValue;
use uuid::Uuid;

/// Ordering operators available to hand-built predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Comparison {
    fn sql(self) -> &'static str {
        match self {
            Self::NotEqual => "<>",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        }
    }
}

/// One filter constraint, or a composition of constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    IsNull { field: String },
    Equals { field: String, value: Value },
    Compare { field: String, op: Comparison, value: Value },
    /// Case-insensitive substring match (ASCII case folding).
    Contains { field: String, needle: String },
    /// Closed interval `low <= field <= high`.
    Between { field: String, low: Value, high: Value },
    /// Set membership; an empty set matches nothing.
    OneOf { field: String, values: Vec<Value> },
    AllOf(Vec<Predicate>),
    AnyOf(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Caller-written SQL fragment with `?` placeholders. Not validated.
    Raw { sql: String, params: Vec<Value> },
}

impl Predicate {
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::IsNull {
            field: field.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, Comparison::NotEqual, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, Comparison::Less, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, Comparison::LessOrEqual, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, Comparison::Greater, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, Comparison::GreaterOrEqual, value)
    }

    pub fn compare(field: impl Into<String>, op: Comparison, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Contains {
            field: field.into(),
            needle: needle.into(),
        }
    }

    pub fn between(
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Self::Between {
            field: field.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn one_of<T: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        Self::OneOf {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn raw<T: Into<Value>>(sql: impl Into<String>, params: impl IntoIterator<Item = T>) -> Self {
        Self::Raw {
            sql: sql.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::AllOf(mut parts) => {
                parts.push(other);
                Self::AllOf(parts)
            }
            first => Self::AllOf(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Self::AnyOf(mut parts) => {
                parts.push(other);
                Self::AnyOf(parts)
            }
            first => Self::AnyOf(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Field names referenced by this predicate tree (raw fragments excluded).
    pub fn fields(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_fields(&mut names);
        names
    }

    fn collect_fields<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::IsNull { field }
            | Self::Equals { field, .. }
            | Self::Compare { field, .. }
            | Self::Contains { field, .. }
            | Self::Between { field, .. }
            | Self::OneOf { field, .. } => names.push(field),
            Self::AllOf(parts) | Self::AnyOf(parts) => {
                for part in parts {
                    part.collect_fields(names);
                }
            }
            Self::Not(inner) => inner.collect_fields(names),
            Self::Raw { .. } => {}
        }
    }

    /// Renders the predicate with positional `?` placeholders, appending
    /// bound values to `binds` in placeholder order.
    pub(crate) fn to_sql(&self, binds: &mut Vec<SqlValue>) -> String {
        match self {
            Self::IsNull { field } => format!("\"{field}\" IS NULL"),
            Self::Equals { field, value } => {
                if value.is_null() {
                    return format!("\"{field}\" IS NULL");
                }
                binds.push(value.to_sql());
                format!("\"{field}\" = ?")
            }
            Self::Compare { field, op, value } => {
                binds.push(value.to_sql());
                format!("\"{field}\" {} ?", op.sql())
            }
            Self::Contains { field, needle } => {
                binds.push(SqlValue::Text(format!("%{}%", escape_like(needle))));
                format!("\"{field}\" LIKE ? ESCAPE '\\'")
            }
            Self::Between { field, low, high } => {
                binds.push(low.to_sql());
                binds.push(high.to_sql());
                format!("\"{field}\" BETWEEN ? AND ?")
            }
            Self::OneOf { field, values } => {
                if values.is_empty() {
                    return "0 = 1".to_string();
                }
                binds.extend(values.iter().map(Value::to_sql));
                let placeholders = vec!["?"; values.len()].join(", ");
                format!("\"{field}\" IN ({placeholders})")
            }
            Self::AllOf(parts) => join_parts(parts, " AND ", "1 = 1", binds),
            Self::AnyOf(parts) => join_parts(parts, " OR ", "0 = 1", binds),
            Self::Not(inner) => format!("NOT ({})", inner.to_sql(binds)),
            Self::Raw { sql, params } => {
                binds.extend(params.iter().map(Value::to_sql));
                format!("({sql})")
            }
        }
    }
}

fn join_parts(parts: &[Predicate], separator: &str, empty: &str, binds: &mut Vec<SqlValue>) -> String {
    if parts.is_empty() {
        return empty.to_string();
    }
    let rendered = parts
        .iter()
        .map(|part| part.to_sql(binds))
        .collect::<Vec<_>>()
        .join(separator);
    format!("({rendered})")
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Builds the predicate for one `field = value` filter input.
///
/// Dispatch order:
/// 1. `Null` → `IsNull`.
/// 2. two-element list on a date/datetime field → `Between`.
/// 3. list on any non-list field → `OneOf`.
/// 4. text with `exact_match == false` → `Contains`.
/// 5. otherwise → `Equals` on the value coerced to the field kind.
///
/// # Errors
/// - `ValidationError::UnknownFields` when `field` is not declared.
/// - `ParseError` when text cannot be parsed into an identifier or temporal kind.
pub fn resolve(
    schema: &EntitySchema,
    field: &str,
    value: Value,
    exact_match: bool,
) -> RepoResult<Predicate> {
    let def = schema.field(field).ok_or_else(|| ValidationError::UnknownFields {
        entity: schema.table().to_string(),
        fields: vec![field.to_string()],
    })?;
    let name = def.name().to_string();

    match value {
        Value::Null => Ok(Predicate::IsNull { field: name }),
        Value::List(items) if def.kind().is_temporal() && items.len() == 2 => {
            let mut bounds = items.into_iter();
            let low = coerce(def, bounds.next().unwrap_or_default())?;
            let high = coerce(def, bounds.next().unwrap_or_default())?;
            Ok(Predicate::Between {
                field: name,
                low,
                high,
            })
        }
        Value::List(items) if def.kind() != FieldKind::List => {
            let values = items
                .into_iter()
                .map(|item| coerce(def, item))
                .collect::<RepoResult<Vec<_>>>()?;
            Ok(Predicate::OneOf {
                field: name,
                values,
            })
        }
        Value::Text(needle) if !exact_match => Ok(Predicate::Contains {
            field: name,
            needle,
        }),
        other => Ok(Predicate::Equals {
            field: name,
            value: coerce(def, other)?,
        }),
    }
}

/// Converts a caller value into the representation stored for `field`.
///
/// Values that already match, or that have no sensible conversion, are
/// returned unchanged and compared as-is.
pub(crate) fn coerce(field: &FieldDef, value: Value) -> RepoResult<Value> {
    let coerced = match (field.kind(), value) {
        (_, Value::Null) => Value::Null,
        (FieldKind::Text, value) => value,
        (FieldKind::Integer, value) => value,
        (FieldKind::Float, Value::Integer(number)) => Value::Float(number as f64),
        (FieldKind::Float, value) => value,
        (FieldKind::Boolean, value) => value,
        (FieldKind::Date, Value::Text(text)) => parse_date(&text)
            .or_else(|| parse_datetime(&text).map(|timestamp| timestamp.date()))
            .map(Value::Date)
            .ok_or_else(|| parse_error(field, text))?,
        (FieldKind::Date, Value::DateTime(timestamp)) => Value::Date(timestamp.date()),
        (FieldKind::Date, value) => value,
        (FieldKind::DateTime, Value::Text(text)) => parse_datetime(&text)
            .map(Value::DateTime)
            .ok_or_else(|| parse_error(field, text))?,
        (FieldKind::DateTime, Value::Date(date)) => date
            .and_hms_opt(0, 0, 0)
            .map_or(Value::Date(date), Value::DateTime),
        (FieldKind::DateTime, value) => value,
        (FieldKind::Identifier, Value::Text(text)) => Uuid::parse_str(text.trim())
            .map(Value::Identifier)
            .map_err(|_| parse_error(field, text))?,
        (FieldKind::Identifier, value) => value,
        (FieldKind::List, value) => value,
    };
    Ok(coerced)
}

fn parse_error(field: &FieldDef, input: String) -> ParseError {
    ParseError {
        field: field.name().to_string(),
        input,
        expected: field.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve, Predicate};
    use crate::model::field::{EntitySchema, FieldDef, FieldKind};
    use crate::model::value::Value;
    use crate::repo::{RepoError, ValidationError};
    use chrono::NaiveDate;
    use rusqlite::types::Value as SqlValue;
    use uuid::Uuid;

    fn schema() -> EntitySchema {
        EntitySchema::new(
            "items",
            [
                FieldDef::new("name", FieldKind::Text),
                FieldDef::new("qty", FieldKind::Integer),
                FieldDef::new("price", FieldKind::Float).optional(),
                FieldDef::new("active", FieldKind::Boolean),
                FieldDef::new("released", FieldKind::Date).optional(),
                FieldDef::new("seen_at", FieldKind::DateTime).optional(),
                FieldDef::new("external_id", FieldKind::Identifier).optional(),
                FieldDef::new("tags", FieldKind::List),
            ],
        )
        .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn null_resolves_to_is_null() {
        let predicate = resolve(&schema(), "price", Value::Null, true).unwrap();
        assert_eq!(predicate, Predicate::is_null("price"));
    }

    #[test]
    fn text_resolves_to_equality_or_substring() {
        let exact = resolve(&schema(), "name", "Alice".into(), true).unwrap();
        assert_eq!(exact, Predicate::eq("name", "Alice"));

        let fuzzy = resolve(&schema(), "name", "ali".into(), false).unwrap();
        assert_eq!(fuzzy, Predicate::contains("name", "ali"));
    }

    #[test]
    fn numbers_and_booleans_resolve_to_equality() {
        assert_eq!(
            resolve(&schema(), "qty", 3.into(), false).unwrap(),
            Predicate::eq("qty", 3)
        );
        assert_eq!(
            resolve(&schema(), "price", 2.into(), true).unwrap(),
            Predicate::eq("price", 2.0)
        );
        assert_eq!(
            resolve(&schema(), "active", true.into(), true).unwrap(),
            Predicate::eq("active", true)
        );
    }

    #[test]
    fn two_element_list_on_date_is_a_closed_range() {
        let predicate = resolve(
            &schema(),
            "released",
            Value::range("2021-01-01", "2022-12-31"),
            true,
        )
        .unwrap();
        assert_eq!(
            predicate,
            Predicate::between("released", date(2021, 1, 1), date(2022, 12, 31))
        );
    }

    #[test]
    fn text_on_date_parses_then_compares() {
        let predicate = resolve(&schema(), "released", "2020-01-01".into(), true).unwrap();
        assert_eq!(predicate, Predicate::eq("released", date(2020, 1, 1)));

        let timestamp = resolve(&schema(), "seen_at", "2020-01-01T10:00:00".into(), true).unwrap();
        assert_eq!(
            timestamp,
            Predicate::eq("seen_at", date(2020, 1, 1).and_hms_opt(10, 0, 0).unwrap())
        );
    }

    #[test]
    fn lists_resolve_to_membership() {
        let predicate = resolve(
            &schema(),
            "name",
            Value::list(["active", "pending"]),
            true,
        )
        .unwrap();
        assert_eq!(predicate, Predicate::one_of("name", ["active", "pending"]));

        let three_dates = resolve(
            &schema(),
            "released",
            Value::list(["2020-01-01", "2020-01-02", "2020-01-03"]),
            true,
        )
        .unwrap();
        assert!(matches!(three_dates, Predicate::OneOf { ref values, .. } if values.len() == 3));
    }

    #[test]
    fn list_field_compares_whole_value() {
        let predicate = resolve(&schema(), "tags", Value::list(["a"]), true).unwrap();
        assert_eq!(predicate, Predicate::eq("tags", Value::list(["a"])));
    }

    #[test]
    fn identifier_text_is_parsed_or_rejected() {
        let id = Uuid::new_v4();
        let predicate =
            resolve(&schema(), "external_id", id.to_string().to_uppercase().into(), true)
                .unwrap();
        assert_eq!(predicate, Predicate::eq("external_id", id));

        let err = resolve(&schema(), "external_id", "not-a-uuid".into(), true).unwrap_err();
        match err {
            RepoError::Parse(parse) => {
                assert_eq!(parse.field, "external_id");
                assert_eq!(parse.input, "not-a-uuid");
                assert_eq!(parse.expected, FieldKind::Identifier);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_field_is_a_validation_error() {
        let err = resolve(&schema(), "nope", 1.into(), true).unwrap_err();
        assert!(matches!(
            err,
            RepoError::Validation(ValidationError::UnknownFields { ref fields, .. })
                if fields == &vec!["nope".to_string()]
        ));
    }

    #[test]
    fn renders_parameterized_sql() {
        let predicate = Predicate::eq("name", "Alice")
            .and(Predicate::contains("tags", "50%_off"))
            .and(Predicate::one_of("qty", [1, 2]))
            .and(Predicate::one_of("qty", Vec::<i64>::new()))
            .and(Predicate::is_null("price").or(Predicate::gt("price", 1.5)).not());
        let mut binds = Vec::new();
        let sql = predicate.to_sql(&mut binds);

        assert_eq!(
            sql,
            "(\"name\" = ? AND \"tags\" LIKE ? ESCAPE '\\' AND \"qty\" IN (?, ?) AND 0 = 1 \
             AND NOT ((\"price\" IS NULL OR \"price\" > ?)))"
        );
        assert_eq!(
            binds,
            vec![
                SqlValue::Text("Alice".to_string()),
                SqlValue::Text("%50\\%\\_off%".to_string()),
                SqlValue::Integer(1),
                SqlValue::Integer(2),
                SqlValue::Real(1.5),
            ]
        );
    }

    #[test]
    fn fields_lists_referenced_columns() {
        let predicate = Predicate::eq("a", 1)
            .or(Predicate::between("b", 1, 2).not())
            .or(Predicate::raw("c > ?", [3]));
        assert_eq!(predicate.fields(), vec!["a", "b"]);
    }
}
