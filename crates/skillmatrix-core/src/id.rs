//! Typed entity identifiers.
//!
//! Every id wraps a v4 UUID. The nil UUID stands for "not yet assigned"; the
//! entity store replaces it on insert.

use std::{fmt, hash::Hash, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::Value;

/// Behaviour the entity store needs from an id type.
pub trait EntityId:
  Copy + Eq + Ord + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static
{
  fn generate() -> Self;
  fn is_unset(&self) -> bool;
}

macro_rules! entity_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(pub Uuid);

    impl $name {
      /// A fresh random id.
      pub fn new() -> Self { Self(Uuid::new_v4()) }

      /// The unassigned id.
      pub const fn unset() -> Self { Self(Uuid::nil()) }
    }

    impl EntityId for $name {
      fn generate() -> Self { Self::new() }

      fn is_unset(&self) -> bool { self.0.is_nil() }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
      }
    }

    impl FromStr for $name {
      type Err = uuid::Error;

      fn from_str(s: &str) -> Result<Self, Self::Err> { Uuid::parse_str(s).map(Self) }
    }

    impl From<$name> for Value {
      fn from(id: $name) -> Self { Value::Text(id.to_string()) }
    }
  };
}

entity_id!(
  /// Identifies a [`Group`](crate::entity::Group).
  GroupId
);
entity_id!(
  /// Identifies a [`Category`](crate::entity::Category).
  CategoryId
);
entity_id!(
  /// Identifies a [`Skill`](crate::entity::Skill).
  SkillId
);
entity_id!(
  /// Identifies a [`User`](crate::entity::User).
  UserId
);

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_and_parse_agree() {
    let id = SkillId::new();
    let parsed: SkillId = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
  }

  #[test]
  fn unset_is_nil() {
    assert!(UserId::unset().is_unset());
    assert!(!UserId::new().is_unset());
  }
}
