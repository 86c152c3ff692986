//! Runtime configuration: an optional TOML file under `SKILLMATRIX_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use skillmatrix_core::{GraphConfig, graph::LevelRange};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// SQLite database file.
  #[serde(default = "default_database")]
  pub database:    PathBuf,
  #[serde(default)]
  pub level_range: LevelRange,
}

fn default_database() -> PathBuf { PathBuf::from("skillmatrix.db") }

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    Self::from_sources(config::File::from(path).required(false), environment())
      .with_context(|| format!("failed to load settings from {}", path.display()))
  }

  fn from_sources<S>(file: S, env: config::Environment) -> anyhow::Result<Self>
  where
    S: config::Source + Send + Sync + 'static,
  {
    let settings = config::Config::builder()
      .add_source(file)
      .add_source(env)
      .build()
      .context("failed to read settings")?;

    let mut settings: Settings = settings
      .try_deserialize()
      .context("failed to deserialise settings")?;
    let LevelRange { min, max } = settings.level_range;
    anyhow::ensure!(
      min <= max,
      "level_range.min ({min}) must not exceed level_range.max ({max})"
    );
    settings.database = expand_tilde(&settings.database);
    Ok(settings)
  }

  pub fn graph_config(&self) -> GraphConfig { GraphConfig { level_range: self.level_range } }
}

/// `SKILLMATRIX_DATABASE`, `SKILLMATRIX_LEVEL_RANGE__MAX` and so on.
fn environment() -> config::Environment {
  config::Environment::with_prefix("SKILLMATRIX")
    .prefix_separator("_")
    .separator("__")
    .try_parsing(true)
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
