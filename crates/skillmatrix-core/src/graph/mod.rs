//! [`DomainGraph`]: groups, categories, skills and users with their
//! relationship rules.
//!
//! The graph owns one [`EntityStore`](crate::entity_store::EntityStore) per
//! entity kind behind a single read-write lock. Writers stage the mutation on
//! a copy, commit the resulting statements to the backend in one transaction
//! while still holding the lock, and only then publish the copy. Readers
//! therefore never observe a half-applied cascade or a write that did not
//! reach the backend. Change topics are published after the lock is released.
//!
//! Staging copies every store, so each write costs time linear in the size
//! of the graph, including the ids retired since it was opened. Retired ids
//! live only in memory; after a reopen, fresh v4 ids keep reuse out of reach.

mod sql;
mod tables;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
  backend::Backend,
  entity::{Category, Group, Level, Skill, User},
  error::{Error, Result},
  id::{CategoryId, GroupId, SkillId, UserId},
  notify::ChangeNotifier,
};

use tables::{Changes, Snapshot, Tables};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Inclusive bounds for assessed skill levels. A bound left out of a
/// configuration source keeps its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelRange {
  pub min: u8,
  pub max: u8,
}

impl Default for LevelRange {
  fn default() -> Self { Self { min: 0, max: 5 } }
}

impl LevelRange {
  pub fn contains(&self, level: u8) -> bool { (self.min..=self.max).contains(&level) }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
  #[serde(default)]
  pub level_range: LevelRange,
}

// ─── Patches ─────────────────────────────────────────────────────────────────

/// Fields to change on a group; `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct GroupPatch {
  pub name:        Option<String>,
  pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryPatch {
  pub name:        Option<String>,
  pub description: Option<String>,
  /// `Some(None)` detaches the category into a root.
  pub parent_id:   Option<Option<CategoryId>>,
}

#[derive(Debug, Clone, Default)]
pub struct SkillPatch {
  pub name:        Option<String>,
  pub description: Option<String>,
  /// Move the skill to another category.
  pub category_id: Option<CategoryId>,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
  pub name:  Option<String>,
  pub email: Option<String>,
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// A group's members against the skills any of them has been assessed on.
#[derive(Debug, Clone, Serialize)]
pub struct SkillMatrix {
  pub group:  Group,
  pub skills: Vec<Skill>,
  pub rows:   Vec<MatrixRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatrixRow {
  pub user:   User,
  /// One cell per entry in [`SkillMatrix::skills`], in the same order.
  pub levels: Vec<Option<Level>>,
}

// ─── Graph ───────────────────────────────────────────────────────────────────

/// The referential-integrity store for the skill matrix.
pub struct DomainGraph<B> {
  backend:  B,
  tables:   RwLock<Tables>,
  notifier: Arc<ChangeNotifier>,
  config:   GraphConfig,
}

impl<B> std::fmt::Debug for DomainGraph<B> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DomainGraph")
      .field("config", &self.config)
      .finish_non_exhaustive()
  }
}

impl<B: Backend> DomainGraph<B> {
  /// Load the graph from `backend` with a fresh notifier.
  ///
  /// The schema must already be migrated.
  pub async fn open(backend: B, config: GraphConfig) -> Result<Self> {
    Self::open_with_notifier(backend, config, Arc::new(ChangeNotifier::new())).await
  }

  pub async fn open_with_notifier(
    backend: B,
    config: GraphConfig,
    notifier: Arc<ChangeNotifier>,
  ) -> Result<Self> {
    let snapshot = Snapshot {
      groups:       Self::rows(&backend, sql::SELECT_GROUPS).await?,
      categories:   Self::rows(&backend, sql::SELECT_CATEGORIES).await?,
      skills:       Self::rows(&backend, sql::SELECT_SKILLS).await?,
      users:        Self::rows(&backend, sql::SELECT_USERS).await?,
      skill_levels: Self::rows(&backend, sql::SELECT_SKILL_LEVELS).await?,
    };
    let tables = Tables::load(snapshot)?;
    tracing::debug!(
      groups = tables.groups.len(),
      categories = tables.categories.len(),
      skills = tables.skills.len(),
      users = tables.users.len(),
      "loaded domain graph"
    );
    Ok(Self { backend, tables: RwLock::new(tables), notifier, config })
  }

  async fn rows(backend: &B, sql: &str) -> Result<Vec<crate::backend::Row>> {
    backend.query(sql.to_owned(), vec![]).await.map_err(Error::storage)
  }

  pub fn notifier(&self) -> &Arc<ChangeNotifier> { &self.notifier }

  pub fn config(&self) -> &GraphConfig { &self.config }

  /// Run a mutation under the write lock with write-through and publish its
  /// topics afterwards.
  async fn write<T>(
    &self,
    op: impl FnOnce(&mut Tables, &mut Changes) -> Result<T>,
  ) -> Result<T> {
    let mut guard = self.tables.write().await;
    let mut staged = guard.clone();
    let mut changes = Changes::default();
    let out = op(&mut staged, &mut changes)?;

    if !changes.statements.is_empty() {
      self
        .backend
        .transaction(changes.statements)
        .await
        .map_err(Error::storage)?;
    }
    *guard = staged;
    drop(guard);

    for topic in changes.topics {
      self.notifier.publish(topic);
    }
    Ok(out)
  }

  async fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
    let guard = self.tables.read().await;
    f(&guard)
  }

  // ── Groups ──────────────────────────────────────────────────────────────

  pub async fn create_group(
    &self,
    name: impl Into<String>,
    description: impl Into<String>,
  ) -> Result<Group> {
    let (name, description) = (name.into(), description.into());
    self.write(|t, ch| t.create_group(name, description, ch)).await
  }

  pub async fn update_group(&self, id: GroupId, patch: GroupPatch) -> Result<Group> {
    self.write(|t, ch| t.update_group(id, patch, ch)).await
  }

  /// Delete a group. Its members stay, without a group.
  pub async fn delete_group(&self, id: GroupId) -> Result<Group> {
    self.write(|t, ch| t.delete_group(id, ch)).await
  }

  pub async fn group(&self, id: GroupId) -> Option<Group> {
    self.read(|t| t.groups.get(id).cloned()).await
  }

  pub async fn groups(&self) -> Vec<Group> {
    self.read(|t| t.groups.all().cloned().collect()).await
  }

  /// Members of a group, by name.
  pub async fn get_group_users(&self, id: GroupId) -> Result<Vec<User>> {
    self.read(|t| t.group_users(id)).await
  }

  /// Categories holding a skill any member of the group is assessed on, by
  /// name.
  pub async fn get_group_categories(&self, id: GroupId) -> Result<Vec<Category>> {
    self.read(|t| t.group_categories(id)).await
  }

  pub async fn group_matrix(&self, id: GroupId) -> Result<SkillMatrix> {
    self
      .read(|t| {
        let group = t.groups.require(id)?.clone();
        let skills = t.group_skills(id)?;
        let rows = t
          .group_users(id)?
          .into_iter()
          .map(|user| {
            let levels = skills
              .iter()
              .map(|s| user.skill_levels.get(&s.id).copied())
              .collect();
            MatrixRow { user, levels }
          })
          .collect();
        Ok(SkillMatrix { group, skills, rows })
      })
      .await
  }

  // ── Categories ──────────────────────────────────────────────────────────

  pub async fn create_category(
    &self,
    name: impl Into<String>,
    description: impl Into<String>,
    parent_id: Option<CategoryId>,
  ) -> Result<Category> {
    let (name, description) = (name.into(), description.into());
    self
      .write(|t, ch| t.create_category(name, description, parent_id, ch))
      .await
  }

  pub async fn update_category(&self, id: CategoryId, patch: CategoryPatch) -> Result<Category> {
    self.write(|t, ch| t.update_category(id, patch, ch)).await
  }

  /// Delete a category, its whole subtree, and every skill inside it.
  pub async fn delete_category(&self, id: CategoryId) -> Result<Category> {
    self.write(|t, ch| t.delete_category(id, ch)).await
  }

  pub async fn category(&self, id: CategoryId) -> Option<Category> {
    self.read(|t| t.categories.get(id).cloned()).await
  }

  pub async fn categories(&self) -> Vec<Category> {
    self.read(|t| t.categories.all().cloned().collect()).await
  }

  pub async fn category_children(&self, id: CategoryId) -> Result<Vec<Category>> {
    self.read(|t| t.category_children(id)).await
  }

  pub async fn get_category_skills(&self, id: CategoryId) -> Result<Vec<Skill>> {
    self.read(|t| t.category_skills(id)).await
  }

  // ── Skills ──────────────────────────────────────────────────────────────

  pub async fn create_skill(
    &self,
    name: impl Into<String>,
    category_id: CategoryId,
    description: impl Into<String>,
  ) -> Result<Skill> {
    let (name, description) = (name.into(), description.into());
    self
      .write(|t, ch| t.create_skill(name, category_id, description, ch))
      .await
  }

  pub async fn update_skill(&self, id: SkillId, patch: SkillPatch) -> Result<Skill> {
    self.write(|t, ch| t.update_skill(id, patch, ch)).await
  }

  /// Delete a skill and every assessment of it.
  pub async fn delete_skill(&self, id: SkillId) -> Result<Skill> {
    self.write(|t, ch| t.delete_skill(id, ch)).await
  }

  pub async fn skill(&self, id: SkillId) -> Option<Skill> {
    self.read(|t| t.skills.get(id).cloned()).await
  }

  pub async fn skills(&self) -> Vec<Skill> {
    self.read(|t| t.skills.all().cloned().collect()).await
  }

  // ── Users ───────────────────────────────────────────────────────────────

  pub async fn create_user(
    &self,
    name: impl Into<String>,
    email: impl Into<String>,
    group_id: Option<GroupId>,
  ) -> Result<User> {
    let (name, email) = (name.into(), email.into());
    self
      .write(|t, ch| t.create_user(name, email, group_id, ch))
      .await
  }

  pub async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User> {
    self.write(|t, ch| t.update_user(id, patch, ch)).await
  }

  pub async fn delete_user(&self, id: UserId) -> Result<User> {
    self.write(|t, ch| t.delete_user(id, ch)).await
  }

  /// Reassign a user; `None` removes them from any group.
  pub async fn move_user_to_group(&self, id: UserId, group: Option<GroupId>) -> Result<User> {
    self.write(|t, ch| t.move_user_to_group(id, group, ch)).await
  }

  pub async fn record_skill_level(&self, user: UserId, skill: SkillId, level: u8) -> Result<User> {
    let range = self.config.level_range;
    self
      .write(|t, ch| t.record_skill_level(user, skill, level, range, ch))
      .await
  }

  pub async fn clear_skill_level(&self, user: UserId, skill: SkillId) -> Result<User> {
    self.write(|t, ch| t.clear_skill_level(user, skill, ch)).await
  }

  pub async fn user(&self, id: UserId) -> Option<User> {
    self.read(|t| t.users.get(id).cloned()).await
  }

  pub async fn users(&self) -> Vec<User> {
    self.read(|t| t.users.all().cloned().collect()).await
  }
}
