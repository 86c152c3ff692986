//! Integration tests for `SqliteStore` against an in-memory database:
//! the migration ledger and write-through of the domain graph.

use skillmatrix_core::{
  DomainGraph, Error, GraphConfig, MigrationEngine, MigrationUnit, Version,
  backend::{Backend, Statement, Value},
  schema,
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn migrated() -> SqliteStore {
  let s = store().await;
  let engine = MigrationEngine::open(s.clone()).await.unwrap();
  engine.apply_pending(&schema::units()).await.unwrap();
  s
}

async fn table_exists(s: &SqliteStore, name: &str) -> bool {
  let rows = s
    .query(
      "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1".into(),
      vec![name.into()],
    )
    .await
    .unwrap();
  !rows.is_empty()
}

async fn count(s: &SqliteStore, table: &str) -> i64 {
  let rows = s
    .query(format!("SELECT COUNT(*) FROM {table}"), vec![])
    .await
    .unwrap();
  rows[0].integer(0).unwrap()
}

fn versions(list: &[&str]) -> Vec<Version> { list.iter().map(|v| Version::new(*v)).collect() }

// ─── Migrations ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn apply_pending_is_idempotent() {
  let s = store().await;
  let engine = MigrationEngine::open(s.clone()).await.unwrap();

  let first = engine.apply_pending(&schema::units()).await.unwrap();
  assert_eq!(first.len(), 2);
  let second = engine.apply_pending(&schema::units()).await.unwrap();
  assert!(second.is_empty());

  let applied: Vec<_> = engine.applied_versions().await.unwrap().into_iter().collect();
  assert_eq!(applied, versions(&["0001", "0002"]));
  assert!(table_exists(&s, "users").await);
}

#[tokio::test]
async fn ledger_survives_reopening_the_engine() {
  let s = store().await;
  MigrationEngine::open(s.clone())
    .await
    .unwrap()
    .apply_pending(&schema::units())
    .await
    .unwrap();

  let reopened = MigrationEngine::open(s.clone()).await.unwrap();
  assert!(reopened.apply_pending(&schema::units()).await.unwrap().is_empty());
  let records = reopened.ledger().records().await.unwrap();
  assert_eq!(records[0].name, "create_domain_tables");
  assert!(records[0].applied_at <= records[1].applied_at);
}

#[tokio::test]
async fn rollback_last_inverts_a_single_apply() {
  let s = store().await;
  let engine = MigrationEngine::open(s.clone()).await.unwrap();
  let units = vec![MigrationUnit::new(
    "1",
    "create_t",
    "CREATE TABLE t (id INTEGER);",
    "DROP TABLE t;",
  )];

  let before = engine.applied_versions().await.unwrap();
  engine.apply_pending(&units).await.unwrap();
  assert!(table_exists(&s, "t").await);

  let undone = engine.rollback_last(&units).await.unwrap();
  assert_eq!(undone.version, Version::new("1"));
  assert_eq!(engine.applied_versions().await.unwrap(), before);
  assert!(!table_exists(&s, "t").await);
}

#[tokio::test]
async fn rollback_on_empty_ledger_fails() {
  let s = store().await;
  let engine = MigrationEngine::open(s).await.unwrap();
  let err = engine.rollback_last(&schema::units()).await.unwrap_err();
  assert!(matches!(err, Error::NothingToRollback));
}

#[tokio::test]
async fn rollback_needs_the_unit_definition() {
  let s = store().await;
  let engine = MigrationEngine::open(s).await.unwrap();
  engine.apply_pending(&schema::units()).await.unwrap();

  let err = engine.rollback_last(&schema::units()[..1]).await.unwrap_err();
  assert!(matches!(err, Error::UnitNotFound(v) if v == Version::new("0002")));
  assert_eq!(engine.applied_versions().await.unwrap().len(), 2);
}

#[tokio::test]
async fn failed_unit_stops_the_run_and_is_retried_alone() {
  let s = store().await;
  let engine = MigrationEngine::open(s.clone()).await.unwrap();
  let broken = vec![
    MigrationUnit::new("v1", "one", "CREATE TABLE one (id INTEGER);", "DROP TABLE one;"),
    MigrationUnit::new("v2", "two", "CREATE TABLE two (id INTEGER); NOT SQL;", "DROP TABLE two;"),
    MigrationUnit::new("v3", "three", "CREATE TABLE three (id INTEGER);", "DROP TABLE three;"),
  ];

  let err = engine.apply_pending(&broken).await.unwrap_err();
  assert!(matches!(&err, Error::MigrationFailed { version, .. } if version.as_str() == "v2"));
  let applied: Vec<_> = engine.applied_versions().await.unwrap().into_iter().collect();
  assert_eq!(applied, versions(&["v1"]));
  // The failing unit's partial script was rolled back with it.
  assert!(!table_exists(&s, "two").await);
  assert!(!table_exists(&s, "three").await);

  // `one` has no IF NOT EXISTS, so re-running v1 would fail with a different
  // version in the error.
  let err = engine.apply_pending(&broken).await.unwrap_err();
  assert!(matches!(&err, Error::MigrationFailed { version, .. } if version.as_str() == "v2"));

  let mut fixed = broken.clone();
  fixed[1] = MigrationUnit::new("v2", "two", "CREATE TABLE two (id INTEGER);", "DROP TABLE two;");
  let written = engine.apply_pending(&fixed).await.unwrap();
  assert_eq!(written.iter().map(|r| r.version.as_str()).collect::<Vec<_>>(), ["v2", "v3"]);
}

#[tokio::test]
async fn rollback_to_keeps_the_target() {
  let s = store().await;
  let engine = MigrationEngine::open(s.clone()).await.unwrap();
  let units: Vec<_> = (1..=3)
    .map(|i| {
      MigrationUnit::new(
        i.to_string(),
        format!("t{i}"),
        format!("CREATE TABLE t{i} (id INTEGER);"),
        format!("DROP TABLE t{i};"),
      )
    })
    .collect();
  engine.apply_pending(&units).await.unwrap();

  let undone = engine.rollback_to(&units, &Version::new("1")).await.unwrap();
  assert_eq!(undone.iter().map(|r| r.version.as_str()).collect::<Vec<_>>(), ["3", "2"]);
  assert!(table_exists(&s, "t1").await);
  assert!(!table_exists(&s, "t2").await);

  let err = engine.rollback_to(&units, &Version::new("9")).await.unwrap_err();
  assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn builtin_schema_rolls_back_cleanly() {
  let s = migrated().await;
  let engine = MigrationEngine::open(s.clone()).await.unwrap();
  engine.rollback_last(&schema::units()).await.unwrap();
  engine.rollback_last(&schema::units()).await.unwrap();
  assert!(!table_exists(&s, "users").await);
  assert!(table_exists(&s, "schema_migrations").await);
  assert_eq!(engine.apply_pending(&schema::units()).await.unwrap().len(), 2);
}

// ─── Domain graph write-through ──────────────────────────────────────────────

#[tokio::test]
async fn graph_reloads_with_relationships() {
  let s = migrated().await;
  let (grp, ann, cat, skill) = {
    let g = DomainGraph::open(s.clone(), GraphConfig::default()).await.unwrap();
    let grp = g.create_group("Engineering", "builders").await.unwrap();
    let ann = g.create_user("Ann", "ann@x.com", Some(grp.id)).await.unwrap();
    let root = g.create_category("Languages", "", None).await.unwrap();
    let cat = g.create_category("Systems", "", Some(root.id)).await.unwrap();
    let skill = g.create_skill("Rust", cat.id, "").await.unwrap();
    g.record_skill_level(ann.id, skill.id, 4).await.unwrap();
    (grp, ann, cat, skill)
  };

  let g = DomainGraph::open(s, GraphConfig::default()).await.unwrap();
  let reloaded = g.group(grp.id).await.unwrap();
  assert_eq!(reloaded.description, "builders");
  assert!(reloaded.members.contains(&ann.id));
  assert!(g.category(cat.id).await.unwrap().skills.contains(&skill.id));
  let user = g.user(ann.id).await.unwrap();
  assert_eq!(user.skill_levels.get(&skill.id).map(|l| l.0), Some(4));
}

#[tokio::test]
async fn delete_group_nulls_membership_rows() {
  let s = migrated().await;
  let g = DomainGraph::open(s.clone(), GraphConfig::default()).await.unwrap();
  let grp = g.create_group("G1", "").await.unwrap();
  let ann = g.create_user("Ann", "ann@x.com", Some(grp.id)).await.unwrap();
  g.delete_group(grp.id).await.unwrap();

  let rows = s
    .query("SELECT group_id FROM users WHERE id = ?1".into(), vec![ann.id.into()])
    .await
    .unwrap();
  assert_eq!(rows[0].0[0], Value::Null);
  assert_eq!(count(&s, "user_groups").await, 0);
}

#[tokio::test]
async fn delete_category_removes_subtree_rows() {
  let s = migrated().await;
  let g = DomainGraph::open(s.clone(), GraphConfig::default()).await.unwrap();
  let root = g.create_category("Root", "", None).await.unwrap();
  let child = g.create_category("Child", "", Some(root.id)).await.unwrap();
  let skill = g.create_skill("Go", child.id, "").await.unwrap();
  let ann = g.create_user("Ann", "ann@x.com", None).await.unwrap();
  g.record_skill_level(ann.id, skill.id, 2).await.unwrap();

  g.delete_category(root.id).await.unwrap();

  assert_eq!(count(&s, "categories").await, 0);
  assert_eq!(count(&s, "skills").await, 0);
  assert_eq!(count(&s, "skill_levels").await, 0);
  assert_eq!(count(&s, "users").await, 1);
}

#[tokio::test]
async fn graph_fails_to_open_before_migration() {
  let s = store().await;
  let err = DomainGraph::open(s, GraphConfig::default()).await.unwrap_err();
  assert!(matches!(err, Error::StorageUnavailable(_)));
}

#[tokio::test]
async fn transaction_rolls_back_on_failure() {
  let s = migrated().await;
  let g = DomainGraph::open(s.clone(), GraphConfig::default()).await.unwrap();
  g.create_group("Existing", "").await.unwrap();

  let result = s
    .transaction(vec![
      Statement::exec(
        "INSERT INTO user_groups (id, name, description) VALUES (?1, ?2, '')",
        vec!["a".into(), "Fresh".into()],
      ),
      Statement::exec(
        "INSERT INTO user_groups (id, name, description) VALUES (?1, ?2, '')",
        vec!["b".into(), "Existing".into()],
      ),
    ])
    .await;
  assert!(result.is_err());
  assert_eq!(count(&s, "user_groups").await, 1);
}
