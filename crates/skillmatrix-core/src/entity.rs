//! Domain entities: groups, categories, skills and users.
//!
//! Relationship sets (`Group::members`, `Category::skills`) are owned by the
//! domain graph and rebuilt from the denormalised foreign keys on load; they
//! are never persisted on their own.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::id::{CategoryId, EntityId, GroupId, SkillId, UserId};

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// The four entity kinds the graph manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  Group,
  Category,
  Skill,
  User,
}

// ─── Keyed entities ──────────────────────────────────────────────────────────

/// A uniqueness-bearing field value.
///
/// Two keys collide when `field`, `scope` and `value` are all equal. `scope`
/// narrows the uniqueness domain (a skill name only has to be unique inside
/// its category); an empty scope is the global one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniqueKey {
  pub field: &'static str,
  pub scope: String,
  pub value: String,
}

impl UniqueKey {
  pub fn global(field: &'static str, value: &str) -> Self {
    Self { field, scope: String::new(), value: value.to_owned() }
  }

  pub fn scoped(field: &'static str, scope: impl ToString, value: &str) -> Self {
    Self { field, scope: scope.to_string(), value: value.to_owned() }
  }
}

/// Anything an [`EntityStore`](crate::entity_store::EntityStore) can hold.
pub trait Entity: Clone + Send + Sync + 'static {
  type Id: EntityId;

  const KIND: EntityKind;

  fn id(&self) -> Self::Id;

  fn set_id(&mut self, id: Self::Id);

  /// Listing order key. By convention the display name.
  fn sort_key(&self) -> &str;

  fn unique_keys(&self) -> Vec<UniqueKey>;
}

// ─── Group ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
  pub id:          GroupId,
  pub name:        String,
  pub description: String,
  pub members:     BTreeSet<UserId>,
}

impl Group {
  pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      id:          GroupId::unset(),
      name:        name.into(),
      description: description.into(),
      members:     BTreeSet::new(),
    }
  }
}

impl Entity for Group {
  type Id = GroupId;

  const KIND: EntityKind = EntityKind::Group;

  fn id(&self) -> GroupId { self.id }

  fn set_id(&mut self, id: GroupId) { self.id = id; }

  fn sort_key(&self) -> &str { &self.name }

  fn unique_keys(&self) -> Vec<UniqueKey> { vec![UniqueKey::global("name", &self.name)] }
}

// ─── Category ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
  pub id:          CategoryId,
  pub name:        String,
  pub description: String,
  pub parent_id:   Option<CategoryId>,
  pub skills:      BTreeSet<SkillId>,
}

impl Category {
  pub fn new(
    name: impl Into<String>,
    description: impl Into<String>,
    parent_id: Option<CategoryId>,
  ) -> Self {
    Self {
      id: CategoryId::unset(),
      name: name.into(),
      description: description.into(),
      parent_id,
      skills: BTreeSet::new(),
    }
  }
}

impl Entity for Category {
  type Id = CategoryId;

  const KIND: EntityKind = EntityKind::Category;

  fn id(&self) -> CategoryId { self.id }

  fn set_id(&mut self, id: CategoryId) { self.id = id; }

  fn sort_key(&self) -> &str { &self.name }

  // Siblings share a scope; all roots share the empty scope.
  fn unique_keys(&self) -> Vec<UniqueKey> {
    let scope = self.parent_id.map(|p| p.to_string()).unwrap_or_default();
    vec![UniqueKey::scoped("name", scope, &self.name)]
  }
}

// ─── Skill ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
  pub id:          SkillId,
  pub name:        String,
  pub category_id: CategoryId,
  pub description: String,
}

impl Skill {
  pub fn new(
    name: impl Into<String>,
    category_id: CategoryId,
    description: impl Into<String>,
  ) -> Self {
    Self {
      id: SkillId::unset(),
      name: name.into(),
      category_id,
      description: description.into(),
    }
  }
}

impl Entity for Skill {
  type Id = SkillId;

  const KIND: EntityKind = EntityKind::Skill;

  fn id(&self) -> SkillId { self.id }

  fn set_id(&mut self, id: SkillId) { self.id = id; }

  fn sort_key(&self) -> &str { &self.name }

  fn unique_keys(&self) -> Vec<UniqueKey> {
    vec![UniqueKey::scoped("name", self.category_id, &self.name)]
  }
}

// ─── User ────────────────────────────────────────────────────────────────────

/// An assessed proficiency. Valid values are bounded by
/// [`LevelRange`](crate::graph::LevelRange).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Level(pub u8);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id:           UserId,
  pub name:         String,
  pub email:        String,
  pub group_id:     Option<GroupId>,
  pub skill_levels: BTreeMap<SkillId, Level>,
}

impl User {
  pub fn new(
    name: impl Into<String>,
    email: impl Into<String>,
    group_id: Option<GroupId>,
  ) -> Self {
    Self {
      id: UserId::unset(),
      name: name.into(),
      email: email.into(),
      group_id,
      skill_levels: BTreeMap::new(),
    }
  }
}

impl Entity for User {
  type Id = UserId;

  const KIND: EntityKind = EntityKind::User;

  fn id(&self) -> UserId { self.id }

  fn set_id(&mut self, id: UserId) { self.id = id; }

  fn sort_key(&self) -> &str { &self.name }

  fn unique_keys(&self) -> Vec<UniqueKey> { vec![UniqueKey::global("email", &self.email)] }
}
