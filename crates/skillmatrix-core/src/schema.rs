//! Built-in migration units for the skill matrix tables.
//!
//! Only `Group.members` and `Category.skills` are absent: both are derived
//! from the `group_id` / `category_id` foreign keys when the graph loads.

use crate::migration::MigrationUnit;

const CREATE_DOMAIN_TABLES: &str = "
CREATE TABLE user_groups (
    id           TEXT PRIMARY KEY,
    name         TEXT NOT NULL UNIQUE,
    description  TEXT NOT NULL DEFAULT ''
);

-- Categories form a forest through parent_id.
CREATE TABLE categories (
    id           TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    description  TEXT NOT NULL DEFAULT '',
    parent_id    TEXT REFERENCES categories(id),
    UNIQUE (parent_id, name)
);

CREATE TABLE skills (
    id           TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    category_id  TEXT NOT NULL REFERENCES categories(id),
    description  TEXT NOT NULL DEFAULT '',
    UNIQUE (category_id, name)
);

CREATE TABLE users (
    id           TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    email        TEXT NOT NULL UNIQUE,
    group_id     TEXT REFERENCES user_groups(id)
);

CREATE TABLE skill_levels (
    user_id      TEXT NOT NULL REFERENCES users(id),
    skill_id     TEXT NOT NULL REFERENCES skills(id),
    level        INTEGER NOT NULL,
    PRIMARY KEY (user_id, skill_id)
);
";

const DROP_DOMAIN_TABLES: &str = "
DROP TABLE skill_levels;
DROP TABLE users;
DROP TABLE skills;
DROP TABLE categories;
DROP TABLE user_groups;
";

const ADD_LOOKUP_INDEXES: &str = "
CREATE INDEX users_group_idx         ON users(group_id);
CREATE INDEX categories_parent_idx   ON categories(parent_id);
CREATE INDEX skills_category_idx     ON skills(category_id);
CREATE INDEX skill_levels_skill_idx  ON skill_levels(skill_id);
";

const DROP_LOOKUP_INDEXES: &str = "
DROP INDEX skill_levels_skill_idx;
DROP INDEX skills_category_idx;
DROP INDEX categories_parent_idx;
DROP INDEX users_group_idx;
";

/// Every built-in unit, oldest first.
pub fn units() -> Vec<MigrationUnit> {
  vec![
    MigrationUnit::new("0001", "create_domain_tables", CREATE_DOMAIN_TABLES, DROP_DOMAIN_TABLES),
    MigrationUnit::new("0002", "add_lookup_indexes", ADD_LOOKUP_INDEXES, DROP_LOOKUP_INDEXES),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn versions_ascend_in_declaration_order() {
    let units = units();
    assert!(units.windows(2).all(|w| w[0].version < w[1].version));
  }
}
