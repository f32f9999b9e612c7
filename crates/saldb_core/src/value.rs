//! Dynamic field values and their declared kinds.

use crate::object::ObjectId;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The declared kind of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueKind {
    /// `true` / `false`.
    Boolean,
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit float.
    Float,
    /// UTF-8 text of any length.
    Text,
    /// Calendar date.
    Date,
    /// UTC timestamp.
    DateTime,
    /// Opaque binary blob.
    Bytes,
    /// Reference to another persistent object.
    Reference,
    /// Values of a nested schema.
    Nested,
}

impl ValueKind {
    /// Returns true for kinds an ordered or hash index can key on.
    #[must_use]
    pub const fn is_scalar(self) -> bool {
        !matches!(self, Self::Bytes | Self::Nested)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Bytes => "bytes",
            Self::Reference => "reference",
            Self::Nested => "nested",
        };
        f.write_str(name)
    }
}

/// A dynamic field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Text string.
    Text(String),
    /// Calendar date.
    Date(NaiveDate),
    /// UTC timestamp.
    DateTime(DateTime<Utc>),
    /// Binary blob.
    Bytes(Vec<u8>),
    /// Reference to another object by id.
    Reference(ObjectId),
    /// Field values of a nested schema, keyed by field name.
    Nested(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the kind of this value, or `None` for `Null`.
    #[must_use]
    pub fn kind(&self) -> Option<ValueKind> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Integer(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::Date(_) => ValueKind::Date,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Reference(_) => ValueKind::Reference,
            Value::Nested(_) => ValueKind::Nested,
        })
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts this value to `kind`, returning the original on failure.
    ///
    /// Accepted conversions: integer to float, ISO 8601 text to date or
    /// datetime, and date to datetime at midnight UTC. `Null` converts to
    /// every kind.
    pub fn coerce(self, kind: ValueKind) -> Result<Value, Value> {
        if self.kind().map_or(true, |k| k == kind) {
            return Ok(self);
        }
        match (self, kind) {
            #[allow(clippy::cast_precision_loss)]
            (Value::Integer(n), ValueKind::Float) => Ok(Value::Float(n as f64)),
            (Value::Text(s), ValueKind::Date) => match NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
                Ok(d) => Ok(Value::Date(d)),
                Err(_) => Err(Value::Text(s)),
            },
            (Value::Text(s), ValueKind::DateTime) => parse_datetime(&s)
                .map(Value::DateTime)
                .ok_or(Value::Text(s)),
            (Value::Date(d), ValueKind::DateTime) => Ok(Value::DateTime(midnight(d))),
            (other, _) => Err(other),
        }
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the referenced object id, if this is a reference.
    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Value::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Get the nested field map, if this is a nested value.
    pub fn as_nested(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Nested(map) => Some(map),
            _ => None,
        }
    }

    /// Collects every object id referenced by this value, including nested ones.
    pub fn references(&self, out: &mut Vec<ObjectId>) {
        match self {
            Value::Reference(id) => out.push(*id),
            Value::Nested(map) => map.values().for_each(|v| v.references(out)),
            _ => {}
        }
    }

    /// Short description used in error messages.
    pub(crate) fn describe(&self) -> String {
        self.kind()
            .map_or_else(|| "null".to_string(), |k| k.to_string())
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(midnight)
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Reference(id)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Nested(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn kind_of_values() {
        assert_eq!(Value::Null.kind(), None);
        assert_eq!(Value::from(1).kind(), Some(ValueKind::Integer));
        assert_eq!(Value::from("x").kind(), Some(ValueKind::Text));
        assert_eq!(Value::from(date(2020, 1, 1)).kind(), Some(ValueKind::Date));
        assert_eq!(
            Value::from(ObjectId::from_bytes([1; 16])).kind(),
            Some(ValueKind::Reference)
        );
    }

    #[test]
    fn integer_coerces_to_float() {
        assert_eq!(Value::from(3).coerce(ValueKind::Float), Ok(Value::Float(3.0)));
    }

    #[test]
    fn text_coerces_to_date_and_datetime() {
        assert_eq!(
            Value::from("2021-01-01").coerce(ValueKind::Date),
            Ok(Value::Date(date(2021, 1, 1)))
        );
        let dt = Value::from("2021-01-01T10:30:00Z")
            .coerce(ValueKind::DateTime)
            .unwrap();
        assert_eq!(dt.kind(), Some(ValueKind::DateTime));
        assert!(Value::from("not a date").coerce(ValueKind::Date).is_err());
    }

    #[test]
    fn date_coerces_to_midnight() {
        let Ok(Value::DateTime(dt)) = Value::from(date(2020, 6, 1)).coerce(ValueKind::DateTime)
        else {
            panic!("expected datetime");
        };
        assert_eq!(dt.to_rfc3339(), "2020-06-01T00:00:00+00:00");
    }

    #[test]
    fn incompatible_coercion_returns_original() {
        let v = Value::from(vec![1u8, 2, 3]);
        assert_eq!(v.clone().coerce(ValueKind::Integer), Err(v));
        assert_eq!(Value::Null.coerce(ValueKind::Integer), Ok(Value::Null));
    }

    #[test]
    fn references_walks_nested_values() {
        let a = ObjectId::from_bytes([1; 16]);
        let b = ObjectId::from_bytes([2; 16]);
        let mut inner = BTreeMap::new();
        inner.insert("owner".to_string(), Value::from(b));
        inner.insert("label".to_string(), Value::from("x"));

        let mut found = Vec::new();
        Value::from(a).references(&mut found);
        Value::Nested(inner).references(&mut found);
        assert_eq!(found, vec![a, b]);
    }

    #[test]
    fn scalar_kinds() {
        assert!(ValueKind::Date.is_scalar());
        assert!(!ValueKind::Bytes.is_scalar());
        assert!(!ValueKind::Nested.is_scalar());
    }
}
