//! Command handlers. Each one prints only after its operation succeeded.

use std::collections::HashMap;

use anyhow::Context as _;
use serde::Serialize;
use skillmatrix_core::{
  DomainGraph, Error, MigrationEngine, Topic, Version,
  entity::{Category, Group, Skill, User},
  graph::SkillMatrix,
  id::{CategoryId, GroupId},
  schema,
};
use skillmatrix_store_sqlite::SqliteStore;

use crate::{
  CategoryCommand, GroupCommand, MigrateArgs, SkillCommand, UserCommand,
  settings::Settings,
};

// ─── Output ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Output {
  pub json: bool,
}

impl Output {
  /// Print `value` as JSON, or fall back to `text`.
  fn emit<T: Serialize>(self, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
    if self.json {
      println!("{}", serde_json::to_string_pretty(value)?);
    } else {
      let text = text();
      if !text.is_empty() {
        println!("{text}");
      }
    }
    Ok(())
  }
}

/// Exit code and short label for a failed command.
pub fn classify(err: &anyhow::Error) -> (u8, &'static str) {
  let Some(core) = err.chain().find_map(|e| e.downcast_ref::<Error>()) else {
    return (1, "error");
  };
  match core {
    Error::Validation(_) | Error::InvalidLevel { .. } => (2, "validation"),
    Error::NotFound { .. } => (3, "not_found"),
    Error::DuplicateKey { .. } => (4, "duplicate_key"),
    Error::CyclicCategory(_) => (5, "cyclic_category"),
    Error::MigrationFailed { .. } => (6, "migration_failed"),
    Error::NothingToRollback => (6, "nothing_to_rollback"),
    Error::UnitNotFound(_) => (6, "unit_not_found"),
    Error::StorageUnavailable(_) | Error::CorruptRow(_) => (7, "storage_unavailable"),
  }
}

// ─── Bootstrap ────────────────────────────────────────────────────────────────

async fn open_store(settings: &Settings) -> anyhow::Result<SqliteStore> {
  SqliteStore::open(&settings.database)
    .await
    .with_context(|| format!("failed to open database at {}", settings.database.display()))
}

/// Migrate, then load the graph and log every change it publishes.
async fn open_graph(settings: &Settings) -> anyhow::Result<DomainGraph<SqliteStore>> {
  let store = open_store(settings).await?;
  let engine = MigrationEngine::open(store.clone()).await?;
  engine.apply_pending(&schema::units()).await?;

  let graph = DomainGraph::open(store, settings.graph_config()).await?;
  for topic in [
    Topic::GroupsChanged,
    Topic::CategoriesChanged,
    Topic::SkillsChanged,
    Topic::UsersChanged,
  ] {
    graph.notifier().subscribe(topic, |t| {
      tracing::debug!(topic = %t, "change published");
      Ok(())
    });
  }
  Ok(graph)
}

// ─── migrate ──────────────────────────────────────────────────────────────────

pub async fn migrate(settings: &Settings, args: MigrateArgs, out: Output) -> anyhow::Result<()> {
  let store = open_store(settings).await?;
  let engine = MigrationEngine::open(store).await?;
  let units = schema::units();
  let verb = if args.rollback.is_some() && !args.status { "rolled back" } else { "applied" };

  let records = if args.status {
    engine.ledger().records().await?
  } else {
    match args.rollback {
      None => engine.apply_pending(&units).await?,
      Some(None) => vec![engine.rollback_last(&units).await?],
      Some(Some(target)) => engine.rollback_to(&units, &Version::new(target)).await?,
    }
  };

  out.emit(&records, || {
    if records.is_empty() {
      let note = if args.status { "no migrations applied" } else { "schema is up to date" };
      return note.to_owned();
    }
    records
      .iter()
      .map(|r| format!("{verb}\t{}\t{}\t{}", r.version, r.name, r.applied_at.to_rfc3339()))
      .collect::<Vec<_>>()
      .join("\n")
  })
}

// ─── group ────────────────────────────────────────────────────────────────────

fn group_line(g: &Group) -> String {
  format!("{}\t{}\t{} members", g.id, g.name, g.members.len())
}

fn user_line(u: &User, groups: &HashMap<GroupId, String>) -> String {
  let group = u
    .group_id
    .and_then(|g| groups.get(&g))
    .map_or("-", String::as_str);
  format!("{}\t{}\t{}\t{}", u.id, u.name, u.email, group)
}

fn matrix_table(m: &SkillMatrix) -> String {
  let mut lines = Vec::with_capacity(m.rows.len() + 1);
  let header: Vec<&str> = m.skills.iter().map(|s| s.name.as_str()).collect();
  lines.push(format!("{}\t{}", m.group.name, header.join("\t")));
  for row in &m.rows {
    let cells: Vec<String> = row
      .levels
      .iter()
      .map(|l| l.map_or_else(|| "-".to_owned(), |l| l.0.to_string()))
      .collect();
    lines.push(format!("{}\t{}", row.user.name, cells.join("\t")));
  }
  lines.join("\n")
}

pub async fn group(settings: &Settings, cmd: GroupCommand, out: Output) -> anyhow::Result<()> {
  let graph = open_graph(settings).await?;
  match cmd {
    GroupCommand::Add { name, description } => {
      let g = graph.create_group(name, description).await?;
      out.emit(&g, || format!("group added\t{}", group_line(&g)))
    }
    GroupCommand::List => {
      let groups = graph.groups().await;
      out.emit(&groups, || groups.iter().map(group_line).collect::<Vec<_>>().join("\n"))
    }
    GroupCommand::Delete { id } => {
      let g = graph.delete_group(id).await?;
      out.emit(&g, || format!("group deleted\t{}\t{}", g.id, g.name))
    }
    GroupCommand::Members { id } => {
      let users = graph.get_group_users(id).await?;
      let names = group_names(&graph).await;
      out.emit(&users, || {
        users.iter().map(|u| user_line(u, &names)).collect::<Vec<_>>().join("\n")
      })
    }
    GroupCommand::Matrix { id } => {
      let matrix = graph.group_matrix(id).await?;
      out.emit(&matrix, || matrix_table(&matrix))
    }
  }
}

async fn group_names(graph: &DomainGraph<SqliteStore>) -> HashMap<GroupId, String> {
  graph
    .groups()
    .await
    .into_iter()
    .map(|g| (g.id, g.name))
    .collect()
}

// ─── category ─────────────────────────────────────────────────────────────────

/// Render the category forest depth-first, children indented under parents.
fn category_tree(categories: &[Category]) -> String {
  let mut children: HashMap<Option<CategoryId>, Vec<&Category>> = HashMap::new();
  for c in categories {
    children.entry(c.parent_id).or_default().push(c);
  }

  let mut lines = Vec::with_capacity(categories.len());
  let mut stack: Vec<(&Category, usize)> = children
    .get(&None)
    .map(|roots| roots.iter().rev().map(|c| (*c, 0)).collect())
    .unwrap_or_default();
  while let Some((c, depth)) = stack.pop() {
    lines.push(format!("{}\t{}{}", c.id, "  ".repeat(depth), c.name));
    if let Some(kids) = children.get(&Some(c.id)) {
      stack.extend(kids.iter().rev().map(|k| (*k, depth + 1)));
    }
  }
  lines.join("\n")
}

pub async fn category(
  settings: &Settings,
  cmd: CategoryCommand,
  out: Output,
) -> anyhow::Result<()> {
  let graph = open_graph(settings).await?;
  match cmd {
    CategoryCommand::Add { name, description, parent } => {
      let c = graph.create_category(name, description, parent).await?;
      out.emit(&c, || format!("category added\t{}\t{}", c.id, c.name))
    }
    CategoryCommand::List => {
      let categories = graph.categories().await;
      out.emit(&categories, || category_tree(&categories))
    }
    CategoryCommand::Delete { id } => {
      let c = graph.delete_category(id).await?;
      out.emit(&c, || format!("category deleted\t{}\t{}", c.id, c.name))
    }
  }
}

// ─── skill ────────────────────────────────────────────────────────────────────

fn skill_line(s: &Skill, categories: &HashMap<CategoryId, String>) -> String {
  let category = categories.get(&s.category_id).map_or("-", String::as_str);
  format!("{}\t{}\t{}", s.id, s.name, category)
}

pub async fn skill(settings: &Settings, cmd: SkillCommand, out: Output) -> anyhow::Result<()> {
  let graph = open_graph(settings).await?;
  match cmd {
    SkillCommand::Add { name, category, description } => {
      let s = graph.create_skill(name, category, description).await?;
      out.emit(&s, || format!("skill added\t{}\t{}", s.id, s.name))
    }
    SkillCommand::List { category } => {
      let skills = match category {
        Some(c) => graph.get_category_skills(c).await?,
        None => graph.skills().await,
      };
      let names: HashMap<CategoryId, String> = graph
        .categories()
        .await
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();
      out.emit(&skills, || {
        skills.iter().map(|s| skill_line(s, &names)).collect::<Vec<_>>().join("\n")
      })
    }
    SkillCommand::Delete { id } => {
      let s = graph.delete_skill(id).await?;
      out.emit(&s, || format!("skill deleted\t{}\t{}", s.id, s.name))
    }
  }
}

// ─── user ─────────────────────────────────────────────────────────────────────

pub async fn user(settings: &Settings, cmd: UserCommand, out: Output) -> anyhow::Result<()> {
  let graph = open_graph(settings).await?;
  match cmd {
    UserCommand::Add { name, email, group } => {
      let u = graph.create_user(name, email, group).await?;
      let names = group_names(&graph).await;
      out.emit(&u, || format!("user added\t{}", user_line(&u, &names)))
    }
    UserCommand::List => {
      let users = graph.users().await;
      let names = group_names(&graph).await;
      out.emit(&users, || {
        users.iter().map(|u| user_line(u, &names)).collect::<Vec<_>>().join("\n")
      })
    }
    UserCommand::Delete { id } => {
      let u = graph.delete_user(id).await?;
      out.emit(&u, || format!("user deleted\t{}\t{}", u.id, u.name))
    }
    UserCommand::Move { id, group } => {
      let u = graph.move_user_to_group(id, group).await?;
      let names = group_names(&graph).await;
      out.emit(&u, || format!("user moved\t{}", user_line(&u, &names)))
    }
    UserCommand::Level { user, skill, level } => {
      let u = graph.record_skill_level(user, skill, level).await?;
      out.emit(&u, || format!("level recorded\t{}\t{skill}\t{level}", u.name))
    }
  }
}
