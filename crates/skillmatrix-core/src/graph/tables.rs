//! The in-memory graph and the relationship rules applied to it.
//!
//! Every operation here runs against a staged copy of [`Tables`] and records
//! what it wrote in a [`Changes`] accumulator. The owning
//! [`DomainGraph`](super::DomainGraph) persists those statements and swaps the
//! staged copy in only if the backend commit succeeds, so an error anywhere in
//! a cascade discards the whole attempt.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
  backend::{Row, Statement},
  entity::{Category, EntityKind, Group, Level, Skill, User},
  entity_store::EntityStore,
  error::{Error, Result},
  id::{CategoryId, GroupId, SkillId, UserId},
  notify::Topic,
};

use super::{CategoryPatch, GroupPatch, LevelRange, SkillPatch, UserPatch, sql};

// ─── Change accumulator ──────────────────────────────────────────────────────

/// Statements to persist and topics to announce for one mutation.
#[derive(Debug, Default)]
pub(crate) struct Changes {
  pub statements: Vec<Statement>,
  pub topics:     BTreeSet<Topic>,
}

impl Changes {
  fn write(&mut self, topic: Topic, statement: Statement) {
    self.statements.push(statement);
    self.topics.insert(topic);
  }
}

// ─── Validation ──────────────────────────────────────────────────────────────

fn required_name(what: &str, name: String) -> Result<String> {
  let trimmed = name.trim();
  if trimmed.is_empty() {
    return Err(Error::Validation(format!("{what} name must not be empty")));
  }
  Ok(trimmed.to_owned())
}

fn valid_email(email: String) -> Result<String> {
  let email = email.trim().to_owned();
  let shape_ok = match email.split_once('@') {
    Some((local, domain)) => {
      !local.is_empty() && !domain.is_empty() && !domain.contains('@')
    }
    None => false,
  };
  if !shape_ok || email.chars().any(char::is_whitespace) {
    return Err(Error::Validation(format!("malformed email address {email:?}")));
  }
  Ok(email)
}

// ─── Tables ──────────────────────────────────────────────────────────────────

/// One [`EntityStore`] per entity kind.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
  pub groups:     EntityStore<Group>,
  pub categories: EntityStore<Category>,
  pub skills:     EntityStore<Skill>,
  pub users:      EntityStore<User>,
}

/// Raw rows read from the backend at open time.
pub(crate) struct Snapshot {
  pub groups:       Vec<Row>,
  pub categories:   Vec<Row>,
  pub skills:       Vec<Row>,
  pub users:        Vec<Row>,
  pub skill_levels: Vec<Row>,
}

impl Tables {
  /// Rebuild the graph, including the derived membership and containment
  /// sets, from persisted rows.
  pub fn load(snapshot: Snapshot) -> Result<Self> {
    let mut t = Tables::default();

    for row in &snapshot.groups {
      t.groups.create(sql::decode_group(row)?)?;
    }
    for row in &snapshot.categories {
      t.categories.create(sql::decode_category(row)?)?;
    }
    let dangling = t
      .categories
      .all()
      .find(|c| c.parent_id.is_some_and(|p| !t.categories.contains(p)));
    if let Some(c) = dangling {
      return Err(Error::CorruptRow(format!("category {} has a missing parent", c.id)));
    }
    for c in t.categories.all() {
      if t.creates_cycle(c.id, c.parent_id) {
        return Err(Error::CyclicCategory(c.id));
      }
    }

    for row in &snapshot.skills {
      let skill = t.skills.create(sql::decode_skill(row)?)?;
      t.categories
        .update(skill.category_id, |c| {
          c.skills.insert(skill.id);
        })
        .map_err(|_| {
          Error::CorruptRow(format!("skill {} has a missing category", skill.id))
        })?;
    }

    for row in &snapshot.users {
      let user = t.users.create(sql::decode_user(row)?)?;
      if let Some(g) = user.group_id {
        t.groups
          .update(g, |g| {
            g.members.insert(user.id);
          })
          .map_err(|_| Error::CorruptRow(format!("user {} has a missing group", user.id)))?;
      }
    }

    for row in &snapshot.skill_levels {
      let (user, skill, level) = sql::decode_skill_level(row)?;
      if !t.skills.contains(skill) {
        return Err(Error::CorruptRow(format!("level for missing skill {skill}")));
      }
      t.users
        .update(user, |u| {
          u.skill_levels.insert(skill, level);
        })
        .map_err(|_| Error::CorruptRow(format!("level for missing user {user}")))?;
    }

    Ok(t)
  }

  // ── Groups ──────────────────────────────────────────────────────────────

  pub fn create_group(
    &mut self,
    name: String,
    description: String,
    ch: &mut Changes,
  ) -> Result<Group> {
    let name = required_name("group", name)?;
    let group = self.groups.create(Group::new(name, description))?;
    ch.write(Topic::GroupsChanged, sql::insert_group(&group));
    Ok(group)
  }

  pub fn update_group(&mut self, id: GroupId, patch: GroupPatch, ch: &mut Changes) -> Result<Group> {
    let name = patch.name.map(|n| required_name("group", n)).transpose()?;
    let group = self.groups.update(id, |g| {
      if let Some(name) = name {
        g.name = name;
      }
      if let Some(description) = patch.description {
        g.description = description;
      }
    })?;
    ch.write(Topic::GroupsChanged, sql::update_group(&group));
    Ok(group)
  }

  /// Delete a group, orphaning (not deleting) its members.
  pub fn delete_group(&mut self, id: GroupId, ch: &mut Changes) -> Result<Group> {
    let members: Vec<UserId> = self.groups.require(id)?.members.iter().copied().collect();
    for user in &members {
      self.users.update(*user, |u| u.group_id = None)?;
    }
    if !members.is_empty() {
      ch.write(Topic::UsersChanged, sql::clear_group_members(id));
    }
    let removed = self.groups.delete(id)?;
    ch.write(Topic::GroupsChanged, sql::delete_group(id));
    Ok(removed)
  }

  // ── Users ───────────────────────────────────────────────────────────────

  pub fn create_user(
    &mut self,
    name: String,
    email: String,
    group_id: Option<GroupId>,
    ch: &mut Changes,
  ) -> Result<User> {
    let name = required_name("user", name)?;
    let email = valid_email(email)?;
    if let Some(g) = group_id {
      self.groups.require(g)?;
    }

    let user = self.users.create(User::new(name, email, group_id))?;
    if let Some(g) = group_id {
      self.groups.update(g, |g| {
        g.members.insert(user.id);
      })?;
    }
    ch.write(Topic::UsersChanged, sql::insert_user(&user));
    Ok(user)
  }

  pub fn update_user(&mut self, id: UserId, patch: UserPatch, ch: &mut Changes) -> Result<User> {
    let name = patch.name.map(|n| required_name("user", n)).transpose()?;
    let email = patch.email.map(valid_email).transpose()?;
    let user = self.users.update(id, |u| {
      if let Some(name) = name {
        u.name = name;
      }
      if let Some(email) = email {
        u.email = email;
      }
    })?;
    ch.write(Topic::UsersChanged, sql::update_user(&user));
    Ok(user)
  }

  pub fn delete_user(&mut self, id: UserId, ch: &mut Changes) -> Result<User> {
    let group = self.users.require(id)?.group_id;
    if let Some(g) = group {
      self.groups.update(g, |g| {
        g.members.remove(&id);
      })?;
    }
    let removed = self.users.delete(id)?;
    ch.write(Topic::UsersChanged, sql::delete_levels_of_user(id));
    ch.write(Topic::UsersChanged, sql::delete_user(id));
    Ok(removed)
  }

  pub fn move_user_to_group(
    &mut self,
    id: UserId,
    target: Option<GroupId>,
    ch: &mut Changes,
  ) -> Result<User> {
    let current = self.users.require(id)?.clone();
    if let Some(g) = target {
      self.groups.require(g)?;
    }
    if current.group_id == target {
      return Ok(current);
    }

    if let Some(old) = current.group_id {
      self.groups.update(old, |g| {
        g.members.remove(&id);
      })?;
    }
    if let Some(new) = target {
      self.groups.update(new, |g| {
        g.members.insert(id);
      })?;
    }
    let user = self.users.update(id, |u| u.group_id = target)?;
    ch.write(Topic::UsersChanged, sql::set_user_group(id, target));
    Ok(user)
  }

  pub fn record_skill_level(
    &mut self,
    user: UserId,
    skill: SkillId,
    level: u8,
    range: LevelRange,
    ch: &mut Changes,
  ) -> Result<User> {
    if !range.contains(level) {
      return Err(Error::InvalidLevel { level, min: range.min, max: range.max });
    }
    self.users.require(user)?;
    self.skills.require(skill)?;

    let level = Level(level);
    let updated = self.users.update(user, |u| {
      u.skill_levels.insert(skill, level);
    })?;
    for statement in sql::upsert_skill_level(user, skill, level) {
      ch.write(Topic::UsersChanged, statement);
    }
    Ok(updated)
  }

  pub fn clear_skill_level(&mut self, user: UserId, skill: SkillId, ch: &mut Changes) -> Result<User> {
    let current = self.users.require(user)?;
    if !current.skill_levels.contains_key(&skill) {
      return Err(Error::not_found(EntityKind::Skill, skill));
    }
    let updated = self.users.update(user, |u| {
      u.skill_levels.remove(&skill);
    })?;
    ch.write(Topic::UsersChanged, sql::delete_skill_level(user, skill));
    Ok(updated)
  }

  // ── Categories ──────────────────────────────────────────────────────────

  /// Whether giving `id` the parent `parent` would put `id` on its own
  /// ancestor chain.
  fn creates_cycle(&self, id: CategoryId, parent: Option<CategoryId>) -> bool {
    let mut seen = HashSet::new();
    let mut cursor = parent;
    while let Some(c) = cursor {
      if c == id || !seen.insert(c) {
        return true;
      }
      cursor = self.categories.get(c).and_then(|c| c.parent_id);
    }
    false
  }

  pub fn create_category(
    &mut self,
    name: String,
    description: String,
    parent_id: Option<CategoryId>,
    ch: &mut Changes,
  ) -> Result<Category> {
    let name = required_name("category", name)?;
    if let Some(p) = parent_id {
      self.categories.require(p)?;
    }
    let mut candidate = Category::new(name, description, parent_id);
    candidate.id = CategoryId::new();
    if self.creates_cycle(candidate.id, parent_id) {
      return Err(Error::CyclicCategory(candidate.id));
    }

    let category = self.categories.create(candidate)?;
    ch.write(Topic::CategoriesChanged, sql::insert_category(&category));
    Ok(category)
  }

  pub fn update_category(
    &mut self,
    id: CategoryId,
    patch: CategoryPatch,
    ch: &mut Changes,
  ) -> Result<Category> {
    self.categories.require(id)?;
    let name = patch.name.map(|n| required_name("category", n)).transpose()?;
    if let Some(parent) = patch.parent_id {
      if let Some(p) = parent {
        self.categories.require(p)?;
      }
      if self.creates_cycle(id, parent) {
        return Err(Error::CyclicCategory(id));
      }
    }

    let category = self.categories.update(id, |c| {
      if let Some(name) = name {
        c.name = name;
      }
      if let Some(description) = patch.description {
        c.description = description;
      }
      if let Some(parent) = patch.parent_id {
        c.parent_id = parent;
      }
    })?;
    ch.write(Topic::CategoriesChanged, sql::update_category(&category));
    Ok(category)
  }

  /// `root` and all its descendants, every child before its parent.
  fn subtree_children_first(&self, root: CategoryId) -> Vec<CategoryId> {
    let mut children: HashMap<CategoryId, Vec<CategoryId>> = HashMap::new();
    for c in self.categories.all() {
      if let Some(p) = c.parent_id {
        children.entry(p).or_default().push(c.id);
      }
    }

    // Pre-order, then reversed: descendants always follow their ancestors in
    // pre-order.
    let mut preorder = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
      preorder.push(id);
      if let Some(kids) = children.get(&id) {
        stack.extend(kids.iter().rev());
      }
    }
    preorder.reverse();
    preorder
  }

  /// Delete a category with every descendant category and every skill they
  /// contain, stripping those skills from user assessments.
  pub fn delete_category(&mut self, id: CategoryId, ch: &mut Changes) -> Result<Category> {
    self.categories.require(id)?;

    let mut root = None;
    for cid in self.subtree_children_first(id) {
      let skills: Vec<SkillId> = self.categories.require(cid)?.skills.iter().copied().collect();
      for skill in skills {
        self.remove_skill(skill, ch)?;
      }
      let removed = self.categories.delete(cid)?;
      ch.write(Topic::CategoriesChanged, sql::delete_category(cid));
      if cid == id {
        root = Some(removed);
      }
    }
    ch.topics.insert(Topic::SkillsChanged);
    root.ok_or_else(|| Error::not_found(EntityKind::Category, id))
  }

  // ── Skills ──────────────────────────────────────────────────────────────

  pub fn create_skill(
    &mut self,
    name: String,
    category_id: CategoryId,
    description: String,
    ch: &mut Changes,
  ) -> Result<Skill> {
    let name = required_name("skill", name)?;
    self.categories.require(category_id)?;

    let skill = self.skills.create(Skill::new(name, category_id, description))?;
    self.categories.update(category_id, |c| {
      c.skills.insert(skill.id);
    })?;
    ch.write(Topic::SkillsChanged, sql::insert_skill(&skill));
    Ok(skill)
  }

  pub fn update_skill(&mut self, id: SkillId, patch: SkillPatch, ch: &mut Changes) -> Result<Skill> {
    let old_category = self.skills.require(id)?.category_id;
    let name = patch.name.map(|n| required_name("skill", n)).transpose()?;
    if let Some(c) = patch.category_id {
      self.categories.require(c)?;
    }

    let skill = self.skills.update(id, |s| {
      if let Some(name) = name {
        s.name = name;
      }
      if let Some(description) = patch.description {
        s.description = description;
      }
      if let Some(c) = patch.category_id {
        s.category_id = c;
      }
    })?;
    if skill.category_id != old_category {
      self.categories.update(old_category, |c| {
        c.skills.remove(&id);
      })?;
      self.categories.update(skill.category_id, |c| {
        c.skills.insert(id);
      })?;
    }
    ch.write(Topic::SkillsChanged, sql::update_skill(&skill));
    Ok(skill)
  }

  pub fn delete_skill(&mut self, id: SkillId, ch: &mut Changes) -> Result<Skill> {
    self.skills.require(id)?;
    self.remove_skill(id, ch)
  }

  /// Remove a skill from its category, from every user's assessments, and
  /// from the skill table.
  fn remove_skill(&mut self, id: SkillId, ch: &mut Changes) -> Result<Skill> {
    let holders: Vec<UserId> = self
      .users
      .all()
      .filter(|u| u.skill_levels.contains_key(&id))
      .map(|u| u.id)
      .collect();
    for user in &holders {
      self.users.update(*user, |u| {
        u.skill_levels.remove(&id);
      })?;
    }
    if !holders.is_empty() {
      ch.write(Topic::UsersChanged, sql::delete_levels_of_skill(id));
    }

    let category = self.skills.require(id)?.category_id;
    if self.categories.contains(category) {
      self.categories.update(category, |c| {
        c.skills.remove(&id);
      })?;
    }
    let removed = self.skills.delete(id)?;
    ch.write(Topic::SkillsChanged, sql::delete_skill(id));
    Ok(removed)
  }

  // ── Queries ─────────────────────────────────────────────────────────────

  pub fn group_users(&self, id: GroupId) -> Result<Vec<User>> {
    let group = self.groups.require(id)?;
    let mut users: Vec<User> = group
      .members
      .iter()
      .filter_map(|u| self.users.get(*u))
      .cloned()
      .collect();
    users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Ok(users)
  }

  /// Skills any member of the group has an assessment for.
  pub fn group_skills(&self, id: GroupId) -> Result<Vec<Skill>> {
    let group = self.groups.require(id)?;
    let assessed: BTreeSet<SkillId> = group
      .members
      .iter()
      .filter_map(|u| self.users.get(*u))
      .flat_map(|u| u.skill_levels.keys().copied())
      .collect();
    let mut skills: Vec<Skill> = assessed
      .iter()
      .filter_map(|s| self.skills.get(*s))
      .cloned()
      .collect();
    skills.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Ok(skills)
  }

  pub fn group_categories(&self, id: GroupId) -> Result<Vec<Category>> {
    let categories: BTreeSet<CategoryId> = self
      .group_skills(id)?
      .iter()
      .map(|s| s.category_id)
      .collect();
    let mut out: Vec<Category> = categories
      .iter()
      .filter_map(|c| self.categories.get(*c))
      .cloned()
      .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Ok(out)
  }

  pub fn category_skills(&self, id: CategoryId) -> Result<Vec<Skill>> {
    let category = self.categories.require(id)?;
    let mut skills: Vec<Skill> = category
      .skills
      .iter()
      .filter_map(|s| self.skills.get(*s))
      .cloned()
      .collect();
    skills.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Ok(skills)
  }

  pub fn category_children(&self, id: CategoryId) -> Result<Vec<Category>> {
    self.categories.require(id)?;
    Ok(
      self
        .categories
        .all()
        .filter(|c| c.parent_id == Some(id))
        .cloned()
        .collect(),
    )
  }
}
