//! Dynamic field values and field-name keyed rows.
//!
//! # Responsibility
//! - Carry caller-supplied filter inputs and decoded column values.
//! - Own the SQLite storage encoding for every `FieldKind`.
//!
//! # Invariants
//! - Dates are stored as `YYYY-MM-DD` and timestamps as
//!   `YYYY-MM-DD HH:MM:SS[.fff]`, so text ordering equals temporal ordering.
//! - Identifiers are stored lowercase and hyphenated.

use crate::model::field::FieldKind;
use crate::repo::{RepoError, RepoResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde::{Serialize, Serializer};
use std::collections::btree_map::{self, BTreeMap};
use uuid::Uuid;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATETIME_T_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A single dynamically typed field value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Identifier(Uuid),
    List(Vec<Value>),
}

impl Value {
    /// Builds the two-element list interpreted as a closed range on temporal fields.
    pub fn range(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::List(vec![low.into(), high.into()])
    }

    /// Builds a list value, interpreted as set membership by `filter`.
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Short name of the variant for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Identifier(_) => "identifier",
            Self::List(_) => "list",
        }
    }

    /// Encodes this value for binding into a statement.
    pub(crate) fn to_sql(&self) -> SqlValue {
        match self {
            Self::Null => SqlValue::Null,
            Self::Text(text) => SqlValue::Text(text.clone()),
            Self::Integer(value) => SqlValue::Integer(*value),
            Self::Float(value) => SqlValue::Real(*value),
            Self::Boolean(value) => SqlValue::Integer(i64::from(*value)),
            Self::Date(date) => SqlValue::Text(date.format(DATE_FORMAT).to_string()),
            Self::DateTime(timestamp) => {
                SqlValue::Text(timestamp.format(DATETIME_FORMAT).to_string())
            }
            Self::Identifier(id) => SqlValue::Text(id.hyphenated().to_string()),
            Self::List(_) => SqlValue::Text(self.to_json().to_string()),
        }
    }

    /// Decodes a stored column according to the declared field kind.
    pub(crate) fn from_sql(kind: FieldKind, raw: ValueRef<'_>) -> Result<Self, String> {
        if let ValueRef::Null = raw {
            return Ok(Self::Null);
        }

        match kind {
            FieldKind::Text => match raw {
                ValueRef::Text(bytes) => Ok(Self::Text(utf8(bytes)?)),
                ValueRef::Integer(value) => Ok(Self::Text(value.to_string())),
                ValueRef::Real(value) => Ok(Self::Text(value.to_string())),
                other => Err(format!("expected text, found {:?}", other.data_type())),
            },
            FieldKind::Integer => match raw {
                ValueRef::Integer(value) => Ok(Self::Integer(value)),
                other => Err(format!("expected integer, found {:?}", other.data_type())),
            },
            FieldKind::Float => match raw {
                ValueRef::Real(value) => Ok(Self::Float(value)),
                ValueRef::Integer(value) => Ok(Self::Float(value as f64)),
                other => Err(format!("expected real, found {:?}", other.data_type())),
            },
            FieldKind::Boolean => match raw {
                ValueRef::Integer(0) => Ok(Self::Boolean(false)),
                ValueRef::Integer(1) => Ok(Self::Boolean(true)),
                ValueRef::Integer(other) => Err(format!("invalid boolean value `{other}`")),
                other => Err(format!("expected integer, found {:?}", other.data_type())),
            },
            FieldKind::Date => {
                let text = text_ref(raw)?;
                parse_date(&text)
                    .map(Self::Date)
                    .ok_or_else(|| format!("invalid date `{text}`"))
            }
            FieldKind::DateTime => {
                let text = text_ref(raw)?;
                parse_datetime(&text)
                    .map(Self::DateTime)
                    .ok_or_else(|| format!("invalid datetime `{text}`"))
            }
            FieldKind::Identifier => {
                let text = text_ref(raw)?;
                Uuid::parse_str(&text)
                    .map(Self::Identifier)
                    .map_err(|_| format!("invalid uuid `{text}`"))
            }
            FieldKind::List => {
                let text = text_ref(raw)?;
                let json: serde_json::Value = serde_json::from_str(&text)
                    .map_err(|err| format!("invalid list json `{text}`: {err}"))?;
                match Self::from_json(json) {
                    list @ Self::List(_) => Ok(list),
                    other => Err(format!("expected json array, found {}", other.type_name())),
                }
            }
        }
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null => Json::Null,
            Self::Text(text) => Json::String(text.clone()),
            Self::Integer(value) => Json::from(*value),
            Self::Float(value) => serde_json::Number::from_f64(*value)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Self::Boolean(value) => Json::Bool(*value),
            Self::Date(date) => Json::String(date.format(DATE_FORMAT).to_string()),
            Self::DateTime(timestamp) => {
                Json::String(timestamp.format(DATETIME_FORMAT).to_string())
            }
            Self::Identifier(id) => Json::String(id.hyphenated().to_string()),
            Self::List(items) => Json::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    fn from_json(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Self::Null,
            Json::Bool(value) => Self::Boolean(value),
            Json::Number(number) => match number.as_i64() {
                Some(value) => Self::Integer(value),
                None => number.as_f64().map_or(Self::Null, Self::Float),
            },
            Json::String(text) => Self::Text(text),
            Json::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            object @ Json::Object(_) => Self::Text(object.to_string()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn utf8(bytes: &[u8]) -> Result<String, String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|err| format!("invalid utf-8 text: {err}"))
}

fn text_ref(raw: ValueRef<'_>) -> Result<String, String> {
    match raw {
        ValueRef::Text(bytes) => utf8(bytes),
        other => Err(format!("expected text, found {:?}", other.data_type())),
    }
}

/// Parses `YYYY-MM-DD`.
pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

/// Parses the stored timestamp layout, its `T`-separated variant, RFC 3339
/// (normalized to UTC) or a bare date at midnight.
pub(crate) fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, DATETIME_T_FORMAT))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|parsed| parsed.naive_utc())
        })
        .or_else(|| parse_date(text).and_then(|date| date.and_hms_opt(0, 0, 0)))
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Self::Identifier(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Typed extraction out of a [`Value`].
pub trait FromValue: Sized {
    /// Human-readable kind used in mismatch errors.
    const EXPECTED: &'static str;

    /// Converts the value, handing it back unchanged on mismatch.
    fn from_value(value: Value) -> Result<Self, Value>;
}

impl FromValue for Value {
    const EXPECTED: &'static str = "any value";

    fn from_value(value: Value) -> Result<Self, Value> {
        Ok(value)
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "text";

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Text(text) => Ok(text),
            other => Err(other),
        }
    }
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Integer(number) => Ok(number),
            other => Err(other),
        }
    }
}

impl FromValue for f64 {
    const EXPECTED: &'static str = "float";

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Float(number) => Ok(number),
            Value::Integer(number) => Ok(number as f64),
            other => Err(other),
        }
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Boolean(flag) => Ok(flag),
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            other => Err(other),
        }
    }
}

impl FromValue for NaiveDate {
    const EXPECTED: &'static str = "date";

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Date(date) => Ok(date),
            other => Err(other),
        }
    }
}

impl FromValue for NaiveDateTime {
    const EXPECTED: &'static str = "datetime";

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::DateTime(timestamp) => Ok(timestamp),
            other => Err(other),
        }
    }
}

impl FromValue for Uuid {
    const EXPECTED: &'static str = "identifier";

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Identifier(id) => Ok(id),
            other => Err(other),
        }
    }
}

impl FromValue for Vec<Value> {
    const EXPECTED: &'static str = "list";

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::List(items) => Ok(items),
            other => Err(other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Field-name keyed mapping used for bulk inputs and plain-mapping results.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Removes `name` and converts it to `T`.
    ///
    /// A missing field reads as `Null`, so `Option<T>` targets tolerate absence.
    ///
    /// # Errors
    /// - `RepoError::InvalidData` when the value does not match `T`.
    pub fn take<T: FromValue>(&mut self, name: &str) -> RepoResult<T> {
        let value = self.0.remove(name).unwrap_or(Value::Null);
        T::from_value(value).map_err(|found| {
            RepoError::InvalidData(format!(
                "field `{name}`: expected {}, found {}",
                T::EXPECTED,
                found.type_name()
            ))
        })
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_datetime, Row, Value};
    use crate::model::field::FieldKind;
    use crate::repo::RepoError;
    use chrono::NaiveDate;
    use rusqlite::types::{Value as SqlValue, ValueRef};
    use uuid::Uuid;

    #[test]
    fn temporal_values_encode_as_sortable_text() {
        let date = NaiveDate::from_ymd_opt(2021, 6, 15).expect("valid date");
        assert_eq!(
            Value::from(date).to_sql(),
            SqlValue::Text("2021-06-15".to_string())
        );

        let timestamp = date.and_hms_opt(8, 30, 0).expect("valid time");
        assert_eq!(
            Value::from(timestamp).to_sql(),
            SqlValue::Text("2021-06-15 08:30:00".to_string())
        );
    }

    #[test]
    fn parse_datetime_accepts_common_layouts() {
        let expected = NaiveDate::from_ymd_opt(2022, 1, 2)
            .and_then(|date| date.and_hms_opt(3, 4, 5))
            .expect("valid timestamp");
        assert_eq!(parse_datetime("2022-01-02 03:04:05"), Some(expected));
        assert_eq!(parse_datetime("2022-01-02T03:04:05"), Some(expected));
        assert_eq!(parse_datetime("2022-01-02T05:04:05+02:00"), Some(expected));
        assert_eq!(
            parse_datetime("2022-01-02"),
            NaiveDate::from_ymd_opt(2022, 1, 2).and_then(|date| date.and_hms_opt(0, 0, 0))
        );
        assert_eq!(parse_datetime("not a time"), None);
    }

    #[test]
    fn decode_respects_field_kind() {
        assert_eq!(
            Value::from_sql(FieldKind::Boolean, ValueRef::Integer(1)),
            Ok(Value::Boolean(true))
        );
        assert!(Value::from_sql(FieldKind::Boolean, ValueRef::Integer(7)).is_err());

        let id = Uuid::new_v4();
        let text = id.to_string();
        assert_eq!(
            Value::from_sql(FieldKind::Identifier, ValueRef::Text(text.as_bytes())),
            Ok(Value::Identifier(id))
        );

        assert_eq!(
            Value::from_sql(FieldKind::List, ValueRef::Text(b"[\"a\",2,true]")),
            Ok(Value::List(vec![
                Value::from("a"),
                Value::Integer(2),
                Value::Boolean(true)
            ]))
        );
        assert_eq!(
            Value::from_sql(FieldKind::Date, ValueRef::Null),
            Ok(Value::Null)
        );
    }

    #[test]
    fn row_take_converts_and_reports_mismatches() {
        let mut row = Row::new()
            .with("name", "Alice")
            .with("age", 31)
            .with("nickname", None::<String>);

        assert_eq!(row.take::<String>("name").unwrap(), "Alice");
        assert_eq!(row.take::<Option<String>>("nickname").unwrap(), None);
        assert_eq!(row.take::<Option<i64>>("missing").unwrap(), None);

        let err = row.take::<String>("age").unwrap_err();
        match err {
            RepoError::InvalidData(message) => {
                assert!(message.contains("`age`"));
                assert!(message.contains("expected text, found integer"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn row_serializes_as_plain_json_object() {
        let row = Row::new()
            .with("id", "p-1")
            .with("tags", vec!["a", "b"])
            .with("joined_on", NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["id"], "p-1");
        assert_eq!(json["tags"], serde_json::json!(["a", "b"]));
        assert_eq!(json["joined_on"], "2020-01-01");
    }
}
