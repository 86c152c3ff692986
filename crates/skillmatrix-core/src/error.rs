//! Error types for `skillmatrix-core`.

use thiserror::Error;

use crate::{entity::EntityKind, id::CategoryId, migration::Version};

/// A boxed error from a backing store or an observer.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// Empty or malformed input, rejected before any mutation.
  #[error("invalid input: {0}")]
  Validation(String),

  #[error("skill level {level} is outside the valid range {min}..={max}")]
  InvalidLevel { level: u8, min: u8, max: u8 },

  #[error("{kind} not found: {id}")]
  NotFound { kind: EntityKind, id: String },

  #[error("duplicate {kind} {field}: {value:?}")]
  DuplicateKey {
    kind:  EntityKind,
    field: &'static str,
    value: String,
  },

  #[error("category {0} cannot become its own ancestor")]
  CyclicCategory(CategoryId),

  #[error("migration {version} failed: {cause}")]
  MigrationFailed {
    version: Version,
    #[source]
    cause:   BoxError,
  },

  #[error("no applied migration to roll back")]
  NothingToRollback,

  #[error("no definition available for migration {0}")]
  UnitNotFound(Version),

  #[error("storage unavailable: {0}")]
  StorageUnavailable(#[source] BoxError),

  #[error("malformed stored row: {0}")]
  CorruptRow(String),
}

impl Error {
  pub(crate) fn not_found(kind: EntityKind, id: impl ToString) -> Self {
    Self::NotFound { kind, id: id.to_string() }
  }

  pub(crate) fn storage<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::StorageUnavailable(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
