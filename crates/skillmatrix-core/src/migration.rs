//! Versioned schema migrations.
//!
//! A [`MigrationUnit`] pairs an `up` and a `down` script under a version.
//! [`MigrationLedger`] records which versions have been applied in the
//! `schema_migrations` table; [`MigrationEngine`] sequences units against it.
//! Applying is idempotent, so callers run it on every start.

use std::{cmp::Ordering, collections::BTreeSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
  backend::{Backend, Row, Statement, Value},
  error::{Error, Result},
};

// ─── Version ─────────────────────────────────────────────────────────────────

/// A migration version string with natural ordering.
///
/// Runs of ASCII digits compare numerically and everything else compares
/// lexically, so `"2" < "10"` and `"0002" < "0010"`. Versions that are equal
/// under that rule fall back to plain string order, keeping `Ord` consistent
/// with `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
  pub fn new(v: impl Into<String>) -> Self { Self(v.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for Version {
  fn from(s: &str) -> Self { Self::new(s) }
}

impl Ord for Version {
  fn cmp(&self, other: &Self) -> Ordering {
    natural_cmp(&self.0, &other.0).then_with(|| self.0.cmp(&other.0))
  }
}

impl PartialOrd for Version {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

/// Split into alternating digit / non-digit runs.
fn chunks(s: &str) -> impl Iterator<Item = &str> {
  let mut rest = s;
  std::iter::from_fn(move || {
    let first = rest.chars().next()?;
    let digits = first.is_ascii_digit();
    let end = rest
      .find(|c: char| c.is_ascii_digit() != digits)
      .unwrap_or(rest.len());
    let (head, tail) = rest.split_at(end);
    rest = tail;
    Some(head)
  })
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
  let mut left = chunks(a);
  let mut right = chunks(b);
  loop {
    match (left.next(), right.next()) {
      (None, None) => return Ordering::Equal,
      (None, Some(_)) => return Ordering::Less,
      (Some(_), None) => return Ordering::Greater,
      (Some(l), Some(r)) => {
        let both_numeric = l.starts_with(|c: char| c.is_ascii_digit())
          && r.starts_with(|c: char| c.is_ascii_digit());
        let ord = if both_numeric {
          let (l, r) = (l.trim_start_matches('0'), r.trim_start_matches('0'));
          l.len().cmp(&r.len()).then_with(|| l.cmp(r))
        } else {
          l.cmp(r)
        };
        if ord != Ordering::Equal {
          return ord;
        }
      }
    }
  }
}

// ─── Units and records ───────────────────────────────────────────────────────

/// A schema transformation script, interpreted by the backend adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transform(pub String);

impl From<&str> for Transform {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl From<String> for Transform {
  fn from(s: String) -> Self { Self(s) }
}

/// One versioned schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationUnit {
  pub version: Version,
  pub name:    String,
  pub up:      Transform,
  pub down:    Transform,
}

impl MigrationUnit {
  pub fn new(
    version: impl Into<String>,
    name: impl Into<String>,
    up: impl Into<Transform>,
    down: impl Into<Transform>,
  ) -> Self {
    Self {
      version: Version::new(version),
      name:    name.into(),
      up:      up.into(),
      down:    down.into(),
    }
  }
}

/// A ledger entry: `version` was applied at `applied_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
  pub version:    Version,
  pub name:       String,
  pub applied_at: DateTime<Utc>,
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

const LEDGER_DDL: &str = "
CREATE TABLE IF NOT EXISTS schema_migrations (
    version     TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    applied_at  TEXT NOT NULL   -- RFC 3339 UTC
);
";

/// The persisted set of applied migration versions.
#[derive(Debug, Clone)]
pub struct MigrationLedger<B> {
  backend: B,
}

impl<B: Backend> MigrationLedger<B> {
  pub fn new(backend: B) -> Self { Self { backend } }

  /// Create the ledger table if it does not exist yet.
  pub async fn ensure(&self) -> Result<()> {
    self
      .backend
      .execute(Statement::script(LEDGER_DDL))
      .await
      .map_err(Error::storage)?;
    Ok(())
  }

  /// Every record, ascending by version.
  pub async fn records(&self) -> Result<Vec<MigrationRecord>> {
    let rows = self
      .backend
      .query(
        "SELECT version, name, applied_at FROM schema_migrations".to_owned(),
        vec![],
      )
      .await
      .map_err(Error::storage)?;

    let mut records = rows
      .iter()
      .map(decode_record)
      .collect::<Result<Vec<_>>>()?;
    records.sort_by(|a, b| a.version.cmp(&b.version));
    Ok(records)
  }

  pub async fn applied_versions(&self) -> Result<BTreeSet<Version>> {
    Ok(self.records().await?.into_iter().map(|r| r.version).collect())
  }

  fn append(record: &MigrationRecord) -> Statement {
    Statement::exec(
      "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
      vec![
        record.version.as_str().into(),
        record.name.clone().into(),
        Value::Text(record.applied_at.to_rfc3339()),
      ],
    )
  }

  fn remove(version: &Version) -> Statement {
    Statement::exec(
      "DELETE FROM schema_migrations WHERE version = ?1",
      vec![version.as_str().into()],
    )
  }
}

fn decode_record(row: &Row) -> Result<MigrationRecord> {
  let applied_at = row.text(2)?;
  let applied_at = DateTime::parse_from_rfc3339(&applied_at)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::CorruptRow(format!("applied_at {applied_at:?}: {e}")))?;
  Ok(MigrationRecord {
    version: Version::new(row.text(0)?),
    name: row.text(1)?,
    applied_at,
  })
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Applies and rolls back [`MigrationUnit`]s, keeping the ledger in step.
///
/// Each unit runs in its own backend transaction together with its ledger
/// write, so a unit is either fully applied and recorded or not at all.
/// Calls on one engine are serialised.
#[derive(Debug)]
pub struct MigrationEngine<B> {
  ledger: MigrationLedger<B>,
  gate:   Mutex<()>,
}

impl<B: Backend> MigrationEngine<B> {
  /// Bind an engine to `backend`, creating the ledger table if needed.
  pub async fn open(backend: B) -> Result<Self> {
    let ledger = MigrationLedger::new(backend);
    ledger.ensure().await?;
    Ok(Self { ledger, gate: Mutex::new(()) })
  }

  pub fn ledger(&self) -> &MigrationLedger<B> { &self.ledger }

  pub async fn applied_versions(&self) -> Result<BTreeSet<Version>> {
    self.ledger.applied_versions().await
  }

  /// Apply every unit not yet in the ledger, in ascending version order.
  ///
  /// Stops at the first failing unit with [`Error::MigrationFailed`]; units
  /// applied earlier in the same call stay applied. Returns the records
  /// written by this call (empty when already up to date).
  pub async fn apply_pending(&self, units: &[MigrationUnit]) -> Result<Vec<MigrationRecord>> {
    let ordered = sorted_units(units)?;
    let _gate = self.gate.lock().await;
    let applied = self.ledger.applied_versions().await?;

    let mut written = Vec::new();
    for unit in ordered.into_iter().filter(|u| !applied.contains(&u.version)) {
      let record = MigrationRecord {
        version:    unit.version.clone(),
        name:       unit.name.clone(),
        applied_at: Utc::now(),
      };
      let statements = vec![
        Statement::script(unit.up.0.clone()),
        MigrationLedger::<B>::append(&record),
      ];
      self
        .ledger
        .backend
        .transaction(statements)
        .await
        .map_err(|e| Error::MigrationFailed {
          version: unit.version.clone(),
          cause:   Box::new(e),
        })?;
      tracing::info!(version = %record.version, name = %record.name, "applied migration");
      written.push(record);
    }

    if written.is_empty() {
      tracing::debug!("schema is up to date");
    }
    Ok(written)
  }

  /// Undo the most recently applied unit and drop its ledger record.
  pub async fn rollback_last(&self, units: &[MigrationUnit]) -> Result<MigrationRecord> {
    let _gate = self.gate.lock().await;
    self.rollback_one(units).await
  }

  /// Roll back, newest first, every applied unit above `target`, leaving
  /// `target` as the latest applied version.
  pub async fn rollback_to(
    &self,
    units: &[MigrationUnit],
    target: &Version,
  ) -> Result<Vec<MigrationRecord>> {
    let _gate = self.gate.lock().await;
    let applied = self.ledger.applied_versions().await?;
    if !applied.contains(target) {
      return Err(Error::Validation(format!("version {target} is not applied")));
    }

    let mut undone = Vec::new();
    for _ in applied.range((std::ops::Bound::Excluded(target), std::ops::Bound::Unbounded)) {
      undone.push(self.rollback_one(units).await?);
    }
    Ok(undone)
  }

  async fn rollback_one(&self, units: &[MigrationUnit]) -> Result<MigrationRecord> {
    let latest = self
      .ledger
      .records()
      .await?
      .pop()
      .ok_or(Error::NothingToRollback)?;
    let unit = units
      .iter()
      .find(|u| u.version == latest.version)
      .ok_or_else(|| Error::UnitNotFound(latest.version.clone()))?;

    let statements = vec![
      Statement::script(unit.down.0.clone()),
      MigrationLedger::<B>::remove(&latest.version),
    ];
    self
      .ledger
      .backend
      .transaction(statements)
      .await
      .map_err(|e| Error::MigrationFailed {
        version: latest.version.clone(),
        cause:   Box::new(e),
      })?;
    tracing::info!(version = %latest.version, name = %latest.name, "rolled back migration");
    Ok(latest)
  }
}

/// Validate a unit list and order it by version.
fn sorted_units(units: &[MigrationUnit]) -> Result<Vec<&MigrationUnit>> {
  let mut ordered: Vec<&MigrationUnit> = units.iter().collect();
  ordered.sort_by(|a, b| a.version.cmp(&b.version));
  for unit in &ordered {
    if unit.version.as_str().trim().is_empty() {
      return Err(Error::Validation(format!(
        "migration {:?} has an empty version",
        unit.name
      )));
    }
  }
  for pair in ordered.windows(2) {
    if pair[0].version == pair[1].version {
      return Err(Error::Validation(format!(
        "duplicate migration version {}",
        pair[0].version
      )));
    }
  }
  Ok(ordered)
}
