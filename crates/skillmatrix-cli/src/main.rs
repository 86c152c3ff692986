//! `skillmatrix`: command-line surface for the skill matrix store.
//!
//! Every command opens the SQLite database named in the configuration,
//! brings its schema up to date, and then works through the domain graph.
//!
//! # Usage
//!
//! ```text
//! skillmatrix migrate --status
//! skillmatrix group add Engineering --description "Builds things"
//! skillmatrix user add Ann ann@example.com --group <GROUP-ID>
//! skillmatrix user level <USER-ID> <SKILL-ID> 3
//! ```

mod commands;
mod settings;

use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use skillmatrix_core::id::{CategoryId, GroupId, SkillId, UserId};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use settings::Settings;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "skillmatrix", version, about = "Skill matrix store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "skillmatrix.toml")]
  config: PathBuf,

  /// Database file; overrides the configuration.
  #[arg(long, value_name = "PATH")]
  database: Option<PathBuf>,

  /// Print results as JSON.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Apply pending schema migrations, or roll them back.
  Migrate(MigrateArgs),
  #[command(subcommand)]
  Group(GroupCommand),
  #[command(subcommand)]
  Category(CategoryCommand),
  #[command(subcommand)]
  Skill(SkillCommand),
  #[command(subcommand)]
  User(UserCommand),
}

#[derive(Args, Debug)]
struct MigrateArgs {
  /// Roll back the latest migration, or every migration newer than VERSION.
  #[arg(long, value_name = "VERSION", num_args = 0..=1)]
  rollback: Option<Option<String>>,

  /// List applied migrations without changing anything.
  #[arg(long, conflicts_with = "rollback")]
  status: bool,
}

#[derive(Subcommand, Debug)]
enum GroupCommand {
  Add {
    name:        String,
    #[arg(short, long, default_value = "")]
    description: String,
  },
  List,
  Delete { id: GroupId },
  /// List a group's members.
  Members { id: GroupId },
  /// Show members against the skills they are assessed on.
  Matrix { id: GroupId },
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
  Add {
    name:        String,
    #[arg(short, long, default_value = "")]
    description: String,
    #[arg(long)]
    parent:      Option<CategoryId>,
  },
  List,
  Delete { id: CategoryId },
}

#[derive(Subcommand, Debug)]
enum SkillCommand {
  Add {
    name:        String,
    #[arg(long)]
    category:    CategoryId,
    #[arg(short, long, default_value = "")]
    description: String,
  },
  List {
    #[arg(long)]
    category: Option<CategoryId>,
  },
  Delete { id: SkillId },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
  Add {
    name:  String,
    email: String,
    #[arg(long)]
    group: Option<GroupId>,
  },
  List,
  Delete { id: UserId },
  /// Move a user to another group; omit `--group` to remove them from theirs.
  Move {
    id:    UserId,
    #[arg(long)]
    group: Option<GroupId>,
  },
  /// Record a user's level in a skill.
  Level {
    user:  UserId,
    skill: SkillId,
    level: u8,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
  // Logs go to stderr so command output stays parseable.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  match run(cli).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      let (code, kind) = commands::classify(&err);
      eprintln!("error[{kind}]: {err:#}");
      ExitCode::from(code)
    }
  }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
  let mut settings = Settings::load(&cli.config)?;
  if let Some(database) = cli.database {
    settings.database = database;
  }
  let out = commands::Output { json: cli.json };

  match cli.command {
    Command::Migrate(args) => commands::migrate(&settings, args, out).await,
    Command::Group(cmd) => commands::group(&settings, cmd, out).await,
    Command::Category(cmd) => commands::category(&settings, cmd, out).await,
    Command::Skill(cmd) => commands::skill(&settings, cmd, out).await,
    Command::User(cmd) => commands::user(&settings, cmd, out).await,
  }
}
