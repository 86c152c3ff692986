//! An in-process [`Backend`] for unit tests: records every committed
//! statement and can be told to fail.

use std::sync::{
  Arc, Mutex,
  atomic::{AtomicBool, Ordering},
};

use thiserror::Error;

use crate::backend::{Backend, Row, Statement, Value};

#[derive(Debug, Error)]
#[error("backend offline")]
pub struct Offline;

#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
  committed: Arc<Mutex<Vec<Statement>>>,
  failing:   Arc<AtomicBool>,
}

impl FakeBackend {
  pub fn set_failing(&self, failing: bool) { self.failing.store(failing, Ordering::SeqCst); }

  pub fn committed(&self) -> Vec<Statement> { self.committed.lock().unwrap().clone() }

  fn check(&self) -> Result<(), Offline> {
    if self.failing.load(Ordering::SeqCst) { Err(Offline) } else { Ok(()) }
  }
}

impl Backend for FakeBackend {
  type Error = Offline;

  async fn execute(&self, statement: Statement) -> Result<usize, Offline> {
    self.check()?;
    self.committed.lock().unwrap().push(statement);
    Ok(1)
  }

  async fn query(&self, _sql: String, _params: Vec<Value>) -> Result<Vec<Row>, Offline> {
    self.check()?;
    Ok(vec![])
  }

  async fn transaction(&self, statements: Vec<Statement>) -> Result<usize, Offline> {
    self.check()?;
    let n = statements.len();
    self.committed.lock().unwrap().extend(statements);
    Ok(n)
  }
}
