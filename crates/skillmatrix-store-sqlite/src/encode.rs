//! Conversions between core [`Value`]s and rusqlite's dynamic values.

use rusqlite::types::Value as SqlValue;
use skillmatrix_core::backend::{Row, Value};

pub fn to_sql(v: Value) -> SqlValue {
  match v {
    Value::Null => SqlValue::Null,
    Value::Integer(n) => SqlValue::Integer(n),
    Value::Real(f) => SqlValue::Real(f),
    Value::Text(s) => SqlValue::Text(s),
    Value::Blob(b) => SqlValue::Blob(b),
  }
}

pub fn from_sql(v: SqlValue) -> Value {
  match v {
    SqlValue::Null => Value::Null,
    SqlValue::Integer(n) => Value::Integer(n),
    SqlValue::Real(f) => Value::Real(f),
    SqlValue::Text(s) => Value::Text(s),
    SqlValue::Blob(b) => Value::Blob(b),
  }
}

pub fn to_params(params: Vec<Value>) -> Vec<SqlValue> { params.into_iter().map(to_sql).collect() }

/// Read every column of a result row.
pub fn decode_row(row: &rusqlite::Row<'_>, columns: usize) -> rusqlite::Result<Row> {
  (0..columns)
    .map(|i| row.get::<_, SqlValue>(i).map(from_sql))
    .collect::<rusqlite::Result<Vec<_>>>()
    .map(Row)
}
