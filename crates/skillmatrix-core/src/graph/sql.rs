//! Statements the graph writes through to the backend, and row decoders for
//! loading it back.
//!
//! Only plain DML with positional parameters; the tables themselves come from
//! [`crate::schema`].

use crate::{
  backend::{Row, Statement, Value},
  entity::{Category, Group, Level, Skill, User},
  error::{Error, Result},
  id::{CategoryId, GroupId, SkillId, UserId},
};

// ─── Groups ──────────────────────────────────────────────────────────────────

pub const SELECT_GROUPS: &str = "SELECT id, name, description FROM user_groups";

pub fn insert_group(g: &Group) -> Statement {
  Statement::exec(
    "INSERT INTO user_groups (id, name, description) VALUES (?1, ?2, ?3)",
    vec![g.id.into(), g.name.clone().into(), g.description.clone().into()],
  )
}

pub fn update_group(g: &Group) -> Statement {
  Statement::exec(
    "UPDATE user_groups SET name = ?2, description = ?3 WHERE id = ?1",
    vec![g.id.into(), g.name.clone().into(), g.description.clone().into()],
  )
}

pub fn delete_group(id: GroupId) -> Statement {
  Statement::exec("DELETE FROM user_groups WHERE id = ?1", vec![id.into()])
}

pub fn decode_group(row: &Row) -> Result<Group> {
  let mut g = Group::new(row.text(1)?, row.text(2)?);
  g.id = row.id(0)?;
  Ok(g)
}

// ─── Categories ──────────────────────────────────────────────────────────────

pub const SELECT_CATEGORIES: &str =
  "SELECT id, name, description, parent_id FROM categories";

pub fn insert_category(c: &Category) -> Statement {
  Statement::exec(
    "INSERT INTO categories (id, name, description, parent_id) VALUES (?1, ?2, ?3, ?4)",
    vec![
      c.id.into(),
      c.name.clone().into(),
      c.description.clone().into(),
      c.parent_id.into(),
    ],
  )
}

pub fn update_category(c: &Category) -> Statement {
  Statement::exec(
    "UPDATE categories SET name = ?2, description = ?3, parent_id = ?4 WHERE id = ?1",
    vec![
      c.id.into(),
      c.name.clone().into(),
      c.description.clone().into(),
      c.parent_id.into(),
    ],
  )
}

pub fn delete_category(id: CategoryId) -> Statement {
  Statement::exec("DELETE FROM categories WHERE id = ?1", vec![id.into()])
}

pub fn decode_category(row: &Row) -> Result<Category> {
  let mut c = Category::new(row.text(1)?, row.text(2)?, row.opt_id(3)?);
  c.id = row.id(0)?;
  Ok(c)
}

// ─── Skills ──────────────────────────────────────────────────────────────────

pub const SELECT_SKILLS: &str = "SELECT id, name, category_id, description FROM skills";

pub fn insert_skill(s: &Skill) -> Statement {
  Statement::exec(
    "INSERT INTO skills (id, name, category_id, description) VALUES (?1, ?2, ?3, ?4)",
    vec![
      s.id.into(),
      s.name.clone().into(),
      s.category_id.into(),
      s.description.clone().into(),
    ],
  )
}

pub fn update_skill(s: &Skill) -> Statement {
  Statement::exec(
    "UPDATE skills SET name = ?2, category_id = ?3, description = ?4 WHERE id = ?1",
    vec![
      s.id.into(),
      s.name.clone().into(),
      s.category_id.into(),
      s.description.clone().into(),
    ],
  )
}

pub fn delete_skill(id: SkillId) -> Statement {
  Statement::exec("DELETE FROM skills WHERE id = ?1", vec![id.into()])
}

pub fn decode_skill(row: &Row) -> Result<Skill> {
  let mut s = Skill::new(row.text(1)?, row.id(2)?, row.text(3)?);
  s.id = row.id(0)?;
  Ok(s)
}

// ─── Users ───────────────────────────────────────────────────────────────────

pub const SELECT_USERS: &str = "SELECT id, name, email, group_id FROM users";

pub fn insert_user(u: &User) -> Statement {
  Statement::exec(
    "INSERT INTO users (id, name, email, group_id) VALUES (?1, ?2, ?3, ?4)",
    vec![
      u.id.into(),
      u.name.clone().into(),
      u.email.clone().into(),
      u.group_id.into(),
    ],
  )
}

pub fn update_user(u: &User) -> Statement {
  Statement::exec(
    "UPDATE users SET name = ?2, email = ?3, group_id = ?4 WHERE id = ?1",
    vec![
      u.id.into(),
      u.name.clone().into(),
      u.email.clone().into(),
      u.group_id.into(),
    ],
  )
}

pub fn set_user_group(id: UserId, group: Option<GroupId>) -> Statement {
  Statement::exec(
    "UPDATE users SET group_id = ?2 WHERE id = ?1",
    vec![id.into(), group.into()],
  )
}

/// Orphan every member of a group.
pub fn clear_group_members(id: GroupId) -> Statement {
  Statement::exec(
    "UPDATE users SET group_id = NULL WHERE group_id = ?1",
    vec![id.into()],
  )
}

pub fn delete_user(id: UserId) -> Statement {
  Statement::exec("DELETE FROM users WHERE id = ?1", vec![id.into()])
}

pub fn decode_user(row: &Row) -> Result<User> {
  let mut u = User::new(row.text(1)?, row.text(2)?, row.opt_id(3)?);
  u.id = row.id(0)?;
  Ok(u)
}

// ─── Skill levels ────────────────────────────────────────────────────────────

pub const SELECT_SKILL_LEVELS: &str = "SELECT user_id, skill_id, level FROM skill_levels";

/// Delete-then-insert keeps the upsert free of dialect-specific syntax.
pub fn upsert_skill_level(user: UserId, skill: SkillId, level: Level) -> [Statement; 2] {
  [
    delete_skill_level(user, skill),
    Statement::exec(
      "INSERT INTO skill_levels (user_id, skill_id, level) VALUES (?1, ?2, ?3)",
      vec![user.into(), skill.into(), Value::from(level.0)],
    ),
  ]
}

pub fn delete_skill_level(user: UserId, skill: SkillId) -> Statement {
  Statement::exec(
    "DELETE FROM skill_levels WHERE user_id = ?1 AND skill_id = ?2",
    vec![user.into(), skill.into()],
  )
}

pub fn delete_levels_of_user(id: UserId) -> Statement {
  Statement::exec("DELETE FROM skill_levels WHERE user_id = ?1", vec![id.into()])
}

pub fn delete_levels_of_skill(id: SkillId) -> Statement {
  Statement::exec("DELETE FROM skill_levels WHERE skill_id = ?1", vec![id.into()])
}

pub fn decode_skill_level(row: &Row) -> Result<(UserId, SkillId, Level)> {
  let raw = row.integer(2)?;
  let level = u8::try_from(raw)
    .map_err(|_| Error::CorruptRow(format!("skill level {raw} out of range")))?;
  Ok((row.id(0)?, row.id(1)?, Level(level)))
}
