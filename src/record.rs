//! Typed records and the munge operation.
//!
//! These types are what flows through the record pipeline. The data lifecycle
//! is:
//!
//! ```text
//! Driver row → Record ── munge(meta) ──→ Record → Writer / BatchInserter
//! ```
//!
//! # Type relationships
//!
//! - A **[`Value`]** is a single cell, tagged with its [`Kind`].
//!   `Value::Null` is a distinguished absent value, not the zero of any kind.
//! - A **[`Record`]** is an ordered row of values, positionally matching the
//!   query's [`RecordMeta`].
//! - A **[`FieldMeta`]** describes one output column: name, kind, and
//!   nullability. The `Value` variant carrying the data *is* the concrete
//!   representation the output layer scans.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::kind::Kind;

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Bool(bool),
    Bytes(Vec<u8>),
    Datetime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::Text(_) => Kind::Text,
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::Decimal(_) => Kind::Decimal,
            Value::Bool(_) => Kind::Bool,
            Value::Bytes(_) => Kind::Bytes,
            Value::Datetime(_) => Kind::Datetime,
            Value::Date(_) => Kind::Date,
            Value::Time(_) => Kind::Time,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// An ordered row of values.
pub type Record = Vec<Value>;

/// Descriptor for one column of a query's output.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMeta {
    pub name: String,
    pub kind: Kind,
    pub nullable: bool,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
        }
    }
}

/// Ordered column descriptors for a query's output. Positions are stable for
/// the duration of the query; the length equals record width.
pub type RecordMeta = Vec<FieldMeta>;

/// Coerces `rec`'s values in place to the kinds the consumer expects.
///
/// Rules:
///
/// - `Null` always passes through.
/// - A value already of the destination kind is left unchanged.
/// - `Int` widens to `Float` or `Decimal`.
/// - `Float` and `Int` convert to `Decimal`.
/// - Time-formatted `Text` parses into `Datetime`, `Date`, or `Time`.
/// - Anything lands in a `Text` destination via its display form.
///
/// # Errors
///
/// [`Error::KindMismatch`] when a non-null value cannot be coerced.
pub fn munge(rec: &mut Record, meta: &RecordMeta) -> Result<()> {
    for (i, field) in meta.iter().enumerate() {
        let Some(val) = rec.get_mut(i) else { break };
        if val.is_null() || val.kind() == field.kind {
            continue;
        }
        let coerced = coerce(val, field.kind).ok_or_else(|| Error::KindMismatch {
            col: field.name.clone(),
            expected: field.kind,
            actual: val.kind(),
        })?;
        *val = coerced;
    }
    Ok(())
}

fn coerce(val: &Value, dest: Kind) -> Option<Value> {
    match (val, dest) {
        (Value::Int(n), Kind::Float) => Some(Value::Float(*n as f64)),
        (Value::Int(n), Kind::Decimal) => Some(Value::Decimal(Decimal::from(*n))),
        (Value::Float(f), Kind::Decimal) => Decimal::from_f64_retain(*f).map(Value::Decimal),
        (Value::Bool(b), Kind::Int) => Some(Value::Int(i64::from(*b))),
        (Value::Text(s), Kind::Datetime) => parse_datetime(s).map(Value::Datetime),
        (Value::Text(s), Kind::Date) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .map(Value::Date),
        (Value::Text(s), Kind::Time) => NaiveTime::parse_from_str(s, "%H:%M:%S")
            .ok()
            .map(Value::Time),
        (_, Kind::Text) => Some(Value::Text(display(val))),
        _ => None,
    }
}

/// Parses the common wire forms of a timestamp: RFC 3339, then the bare
/// `YYYY-MM-DD HH:MM:SS` form SQLite stores.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

fn display(val: &Value) -> String {
    match val {
        Value::Null => String::new(),
        Value::Text(s) => s.clone(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::Datetime(dt) => dt.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::Time(t) => t.format("%H:%M:%S").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(kinds: &[(&str, Kind)]) -> RecordMeta {
        kinds.iter().map(|(n, k)| FieldMeta::new(*n, *k)).collect()
    }

    #[test]
    fn munge_widens_int_to_float() {
        let m = meta(&[("a", Kind::Float)]);
        let mut rec = vec![Value::Int(7)];
        munge(&mut rec, &m).unwrap();
        assert_eq!(rec[0], Value::Float(7.0));
    }

    #[test]
    fn munge_parses_text_into_datetime() {
        let m = meta(&[("ts", Kind::Datetime)]);
        let mut rec = vec![Value::Text("2020-05-01 13:00:00".to_string())];
        munge(&mut rec, &m).unwrap();
        assert!(matches!(rec[0], Value::Datetime(_)));
    }

    #[test]
    fn munge_leaves_null_alone() {
        let m = meta(&[("a", Kind::Int)]);
        let mut rec = vec![Value::Null];
        munge(&mut rec, &m).unwrap();
        assert_eq!(rec[0], Value::Null);
    }

    #[test]
    fn munge_rejects_impossible_coercion() {
        let m = meta(&[("a", Kind::Int)]);
        let mut rec = vec![Value::Bytes(vec![1, 2, 3])];
        let err = munge(&mut rec, &m).unwrap_err();
        assert!(matches!(err, Error::KindMismatch { .. }));
    }
}
