//! [`SqliteStore`]: the SQLite implementation of [`Backend`].

use std::path::Path;

use rusqlite::params_from_iter;
use skillmatrix_core::backend::{Backend, Row, Statement, Value};

use crate::{
  Result,
  encode::{decode_row, to_params},
};

/// Connection pragmas applied on open. Schema comes from migrations only.
const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A backing store on a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl std::fmt::Debug for SqliteStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SqliteStore").finish_non_exhaustive()
  }
}

impl SqliteStore {
  /// Open (or create) a database at `path`.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_connection().await?;
    Ok(store)
  }

  /// Open an in-memory database, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_connection().await?;
    Ok(store)
  }

  async fn init_connection(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Run one statement on an open connection or transaction.
fn run(conn: &rusqlite::Connection, statement: Statement) -> rusqlite::Result<usize> {
  match statement {
    Statement::Script(sql) => {
      conn.execute_batch(&sql)?;
      Ok(0)
    }
    Statement::Exec { sql, params } => {
      let mut stmt = conn.prepare_cached(&sql)?;
      stmt.execute(params_from_iter(to_params(params)))
    }
  }
}

// ─── Backend impl ────────────────────────────────────────────────────────────

impl Backend for SqliteStore {
  type Error = crate::Error;

  async fn execute(&self, statement: Statement) -> Result<usize> {
    let affected = self
      .conn
      .call(move |conn| Ok(run(conn, statement)?))
      .await?;
    Ok(affected)
  }

  async fn query(&self, sql: String, params: Vec<Value>) -> Result<Vec<Row>> {
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(&sql)?;
        let columns = stmt.column_count();
        let rows = stmt
          .query_map(params_from_iter(to_params(params)), |row| decode_row(row, columns))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  async fn transaction(&self, statements: Vec<Statement>) -> Result<usize> {
    let count = statements.len();
    let affected = self
      .conn
      .call(move |conn| {
        // Dropping an uncommitted transaction rolls it back.
        let tx = conn.transaction()?;
        let mut affected = 0;
        for statement in statements {
          affected += run(&tx, statement)?;
        }
        tx.commit()?;
        Ok(affected)
      })
      .await?;
    tracing::trace!(statements = count, affected, "committed transaction");
    Ok(affected)
  }
}
