mod app;
mod cache;
mod commands;
mod config;
mod credentials;
mod entry;
mod error;
mod event;
mod logging;
mod pipe;
mod reconcile;
mod scheduler;
mod source;
mod ui;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "dontforget")]
#[command(about = "Pull tasks from issue trackers and time trackers into a live menu")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/dontforget/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pick an entry and start tracking it
  Track {
    /// Initial fuzzy query
    query: Vec<String>,

    /// Source to pick from (default: the first Toggl source)
    #[arg(short, long)]
    source: Option<String>,

    /// Start right away when the query matches a single entry
    #[arg(short = '1', long)]
    select_1: bool,
  },

  /// Live menu of every source, refreshed in the background
  Menu,

  /// Print the entries of one source
  Pull {
    source: String,

    #[arg(long)]
    json: bool,
  },

  /// Manage stored credentials
  Credential {
    #[command(subcommand)]
    action: CredentialAction,
  },

  /// Manage the response cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand, Debug)]
enum CredentialAction {
  /// Store a secret read from stdin, e.g. `credential set Toggl api_token`
  Set { source: String, name: String },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  /// Remove every cached response
  Clear,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let args = Args::parse();

  // The menu owns the terminal, so it logs to a file
  let _log_guard = match args.command {
    Command::Menu => Some(logging::init_file()?),
    _ => {
      logging::init_stderr();
      None
    }
  };

  match args.command {
    Command::Track {
      query,
      source,
      select_1,
    } => {
      let config = config::Config::load(args.config.as_deref())?;
      commands::track(&config, &query, source.as_deref(), select_1).await
    }
    Command::Menu => {
      let config = config::Config::load(args.config.as_deref())?;
      commands::menu(&config).await?;
      Ok(ExitCode::SUCCESS)
    }
    Command::Pull { source, json } => {
      let config = config::Config::load(args.config.as_deref())?;
      commands::pull(&config, &source, json).await
    }
    Command::Credential {
      action: CredentialAction::Set { source, name },
    } => {
      // Without a config the name is stored as typed
      let config = match config::Config::load(args.config.as_deref()) {
        Ok(config) => Some(config),
        Err(e) => {
          tracing::warn!(error = %e, "no usable config, source name not checked");
          None
        }
      };
      commands::credential_set(config.as_ref(), &source, &name)?;
      Ok(ExitCode::SUCCESS)
    }
    Command::Cache {
      action: CacheAction::Clear,
    } => {
      commands::cache_clear()?;
      Ok(ExitCode::SUCCESS)
    }
  }
}
