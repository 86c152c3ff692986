//! The boundary between the core and a persistent backing store.
//!
//! The core speaks plain, dialect-neutral SQL through [`Backend`]: single
//! parameterised statements, multi-statement scripts for migrations, and row
//! queries. Adapters translate [`Value`]s to and from their driver's types and
//! take care of any dialect quirks.

use std::future::Future;

use crate::{Error, Result};

// ─── Values and rows ─────────────────────────────────────────────────────────

/// A single SQL value crossing the backend boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Integer(i64),
  Real(f64),
  Text(String),
  Blob(Vec<u8>),
}

impl From<&str> for Value {
  fn from(s: &str) -> Self { Value::Text(s.to_owned()) }
}

impl From<String> for Value {
  fn from(s: String) -> Self { Value::Text(s) }
}

impl From<i64> for Value {
  fn from(n: i64) -> Self { Value::Integer(n) }
}

impl From<u8> for Value {
  fn from(n: u8) -> Self { Value::Integer(i64::from(n)) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self { v.map_or(Value::Null, Into::into) }
}

/// One result row, columns in `SELECT` order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(pub Vec<Value>);

impl Row {
  fn column(&self, idx: usize) -> Result<&Value> {
    self
      .0
      .get(idx)
      .ok_or_else(|| Error::CorruptRow(format!("missing column {idx}")))
  }

  /// A non-null text column.
  pub fn text(&self, idx: usize) -> Result<String> {
    match self.column(idx)? {
      Value::Text(s) => Ok(s.clone()),
      other => Err(Error::CorruptRow(format!(
        "column {idx}: expected text, found {other:?}"
      ))),
    }
  }

  /// A nullable text column.
  pub fn opt_text(&self, idx: usize) -> Result<Option<String>> {
    match self.column(idx)? {
      Value::Null => Ok(None),
      _ => self.text(idx).map(Some),
    }
  }

  pub fn integer(&self, idx: usize) -> Result<i64> {
    match self.column(idx)? {
      Value::Integer(n) => Ok(*n),
      other => Err(Error::CorruptRow(format!(
        "column {idx}: expected integer, found {other:?}"
      ))),
    }
  }

  /// A text column holding a typed id.
  pub fn id<T: std::str::FromStr>(&self, idx: usize) -> Result<T> {
    let raw = self.text(idx)?;
    raw
      .parse()
      .map_err(|_| Error::CorruptRow(format!("column {idx}: bad id {raw:?}")))
  }

  pub fn opt_id<T: std::str::FromStr>(&self, idx: usize) -> Result<Option<T>> {
    match self.column(idx)? {
      Value::Null => Ok(None),
      _ => self.id(idx).map(Some),
    }
  }
}

// ─── Statements ──────────────────────────────────────────────────────────────

/// A unit of work handed to a [`Backend`].
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
  /// Several `;`-separated statements without parameters (DDL scripts).
  Script(String),
  /// One statement with positional `?N` parameters.
  Exec { sql: String, params: Vec<Value> },
}

impl Statement {
  pub fn script(sql: impl Into<String>) -> Self { Self::Script(sql.into()) }

  pub fn exec(sql: impl Into<String>, params: Vec<Value>) -> Self {
    Self::Exec { sql: sql.into(), params }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Minimal command interface to a SQL backing store.
///
/// All methods return `Send` futures so a backend can be shared across a
/// multi-threaded runtime.
pub trait Backend: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Run one statement outside an explicit transaction and return the number
  /// of affected rows (`0` for scripts).
  fn execute(
    &self,
    statement: Statement,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Run a parameterised query and return every row.
  fn query(
    &self,
    sql: String,
    params: Vec<Value>,
  ) -> impl Future<Output = Result<Vec<Row>, Self::Error>> + Send + '_;

  /// Run `statements` atomically: begin, execute each in order, commit.
  ///
  /// On any failure the adapter rolls back before returning the error, so
  /// the store is left as it was before the call.
  fn transaction(
    &self,
    statements: Vec<Statement>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}
