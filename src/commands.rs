//! Command handlers behind the CLI subcommands

use color_eyre::{eyre::eyre, Result};
use crossterm::style::Stylize;
use std::io::BufRead;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::app::App;
use crate::cache::{SqliteStorage, TtlCache};
use crate::config::{CacheConfig, Config, SourceConfig};
use crate::credentials::{resolve_api_token, CredentialStore, DefaultStore};
use crate::entry::{Entry, EntryRegistry};
use crate::error::PipeError;
use crate::event::{ChannelSink, EventHandler};
use crate::pipe::Pipe;
use crate::scheduler::{Scheduler, Trigger};
use crate::source::{Source, SourceRegistry};
use crate::ui::picker;

/// Persistent cache per the config, or a disabled one when it cannot be opened.
pub fn open_cache(config: &CacheConfig) -> TtlCache {
  if !config.enabled {
    return TtlCache::disabled();
  }

  match SqliteStorage::open() {
    Ok(storage) => {
      let cache = TtlCache::new(storage).with_ttl(config.ttl());
      debug!(ttl_secs = cache.ttl().num_seconds(), "response cache opened");
      cache
    }
    Err(e) => {
      warn!(error = %e, "cache unavailable, every call goes to the remote API");
      TtlCache::disabled()
    }
  }
}

/// Source used by `track` when none is named: the first Toggl source, else the first one.
fn track_source<'a>(config: &'a Config, name: Option<&str>) -> Result<&'a SourceConfig> {
  match name {
    Some(name) => config
      .source(name)
      .ok_or_else(|| eyre!("No source named '{}' in the config", name)),
    None => config
      .sources
      .iter()
      .find(|s| s.kind.eq_ignore_ascii_case(crate::source::toggl::KIND))
      .or_else(|| config.sources.first())
      .ok_or_else(|| eyre!("No sources configured")),
  }
}

/// Resolve credentials and build the source for one config entry.
fn connect(
  store: &dyn CredentialStore,
  config: &SourceConfig,
  cache: TtlCache,
) -> Result<(SourceConfig, Arc<dyn Source>)> {
  let connection = resolve_api_token(store, config);
  let source = SourceRegistry::with_defaults().create(&connection, cache)?;
  Ok((connection, source))
}

/// Registry for a one-shot command. `None` after printing remediation for a
/// missing credential.
async fn fetch_or_report(
  source: &dyn Source,
  connection: &SourceConfig,
) -> Result<Option<EntryRegistry>> {
  match EntryRegistry::build(source, connection).await {
    Ok(registry) => Ok(Some(registry)),
    Err(e @ PipeError::AuthenticationMissing { .. }) => {
      eprintln!("{}", e.to_string().red());
      Ok(None)
    }
    Err(e) => Err(e.into()),
  }
}

/// `dontforget track`: fuzzy pick an entry and activate it.
pub async fn track(
  config: &Config,
  query: &[String],
  source_name: Option<&str>,
  select_1: bool,
) -> Result<ExitCode> {
  let source_config = track_source(config, source_name)?;
  let (connection, source) = connect(
    &DefaultStore::default(),
    source_config,
    open_cache(&config.cache),
  )?;

  let Some(registry) = fetch_or_report(source.as_ref(), &connection).await? else {
    return Ok(ExitCode::from(2));
  };
  if registry.is_empty() {
    eprintln!("{} returned no entries", connection.name);
    return Ok(ExitCode::from(1));
  }

  let names: Vec<String> = registry.names().map(String::from).collect();
  let query = query.join(" ");
  let chosen = tokio::task::spawn_blocking(move || picker::pick(names, &query, select_1)).await??;

  let Some(entry) = chosen.as_deref().and_then(|name| registry.get(name)) else {
    eprintln!("No entry chosen");
    return Ok(ExitCode::from(1));
  };

  println!("Starting {}", entry.label().bold());
  source.activate(&connection, entry).await?;
  Ok(ExitCode::SUCCESS)
}

fn entry_line(entry: &Entry) -> String {
  let mut line = entry.label();
  if let Some(due) = &entry.due {
    line.push_str(&format!("  due {}", due));
  }
  if let Some(reference) = &entry.reference {
    line.push_str(&format!("  {}", reference));
  }
  if entry.project.is_some() && !entry.is_resolved() {
    line.push_str("  (unresolved)");
  }
  line
}

/// `dontforget pull`: print the entries of one source.
pub async fn pull(config: &Config, name: &str, json: bool) -> Result<ExitCode> {
  let source_config = config
    .source(name)
    .ok_or_else(|| eyre!("No source named '{}' in the config", name))?;
  let (connection, source) = connect(
    &DefaultStore::default(),
    source_config,
    open_cache(&config.cache),
  )?;

  let Some(registry) = fetch_or_report(source.as_ref(), &connection).await? else {
    return Ok(ExitCode::from(2));
  };

  if json {
    let entries: Vec<&Entry> = registry.iter().collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
  } else {
    for entry in registry.iter() {
      println!("{}", entry_line(entry));
    }
  }
  Ok(ExitCode::SUCCESS)
}

/// Store `secret` under the source's name as spelled in the config, which is
/// the name lookups use. Returns that name.
fn store_credential(
  store: &dyn CredentialStore,
  config: Option<&Config>,
  source_name: &str,
  credential_name: &str,
  secret: &str,
) -> Result<String> {
  let source_name = match config.and_then(|c| c.source(source_name)) {
    Some(source) => source.name.clone(),
    None => {
      if config.is_some() {
        warn!(source = source_name, "no source with this name in the config, storing as typed");
      }
      source_name.to_string()
    }
  };

  store.set_credential(&source_name, credential_name, secret)?;
  Ok(source_name)
}

/// `dontforget credential set`: store a secret read from stdin.
pub fn credential_set(config: Option<&Config>, source_name: &str, credential_name: &str) -> Result<()> {
  eprintln!("Paste the {} for {} and press Enter:", credential_name, source_name);

  let mut secret = String::new();
  std::io::stdin().lock().read_line(&mut secret)?;
  let secret = secret.trim();
  if secret.is_empty() {
    return Err(eyre!("Empty secret, nothing stored"));
  }

  let stored_as = store_credential(
    &DefaultStore::default(),
    config,
    source_name,
    credential_name,
    secret,
  )?;
  println!("Stored {} for {}", credential_name, stored_as);
  Ok(())
}

/// `dontforget cache clear`
pub fn cache_clear() -> Result<()> {
  let removed = TtlCache::new(SqliteStorage::open()?).clear()?;
  println!("Removed {} cached responses", removed);
  Ok(())
}

/// One pipe per source that could be built, in config order. Pipe `i` sends
/// its display commands tagged with `i`.
fn build_pipes(
  config: &Config,
  store: &dyn CredentialStore,
  cache: &TtlCache,
  events: &EventHandler,
) -> Vec<Arc<Pipe>> {
  let mut pipes = Vec::new();

  for source_config in &config.sources {
    match connect(store, source_config, cache.clone()) {
      Ok((connection, source)) => {
        let sink = ChannelSink::new(pipes.len(), events.sender());
        pipes.push(Arc::new(Pipe::new(connection, source, Box::new(sink))));
      }
      Err(e) => warn!(source = %source_config.name, error = %e, "source skipped"),
    }
  }
  pipes
}

/// `dontforget menu`: the live terminal menu with background refresh.
pub async fn menu(config: &Config) -> Result<()> {
  let events = EventHandler::new(Duration::from_millis(250));
  let cache = open_cache(&config.cache);
  let pipes = build_pipes(config, &DefaultStore::default(), &cache, &events);
  if pipes.is_empty() {
    return Err(eyre!("No usable sources configured"));
  }
  info!(pipes = pipes.len(), "starting menu");

  let (triggers, scheduler) = Scheduler::new(pipes.clone(), &config.scheduler).spawn();

  let result = App::new(pipes, triggers.clone()).run(events).await;

  let _ = triggers.send(Trigger::Shutdown);
  scheduler.await?;
  result
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::credentials::testing::MemoryStore;

  fn config() -> Config {
    Config::from_yaml(
      r#"
sources:
  - name: Work
    type: redmine
    url: https://redmine.example.com
    project_id: web
  - name: Time
    type: toggl
  - name: Broken
    type: trello
"#,
    )
    .unwrap()
  }

  #[test]
  fn test_track_defaults_to_first_toggl_source() {
    let config = config();
    assert_eq!(track_source(&config, None).unwrap().name, "Time");
    assert_eq!(track_source(&config, Some("Work")).unwrap().name, "Work");
    assert!(track_source(&config, Some("Nope")).is_err());
  }

  #[test]
  fn test_track_falls_back_to_first_source() {
    let config = Config::from_yaml(
      r#"
sources:
  - name: Work
    type: redmine
"#,
    )
    .unwrap();
    assert_eq!(track_source(&config, None).unwrap().name, "Work");
    assert!(track_source(&Config::default(), None).is_err());
  }

  #[test]
  fn test_connect_resolves_token_from_store() {
    let store = MemoryStore::default();
    store.set_credential("Work", "api_token", "secret").unwrap();

    let config = config();
    let (connection, source) = connect(&store, &config.sources[0], TtlCache::disabled()).unwrap();
    assert_eq!(connection.api_token.as_deref(), Some("secret"));
    assert_eq!(source.kind(), "redmine");
  }

  #[test]
  fn test_stored_credential_uses_configured_name() {
    let store = MemoryStore::default();
    let config = config();

    let stored_as = store_credential(&store, Some(&config), "time", "api_token", "secret").unwrap();
    assert_eq!(stored_as, "Time");

    let resolved = resolve_api_token(&store, &config.sources[1]);
    assert_eq!(resolved.api_token.as_deref(), Some("secret"));
  }

  #[test]
  fn test_stored_credential_without_config_keeps_typed_name() {
    let store = MemoryStore::default();
    let stored_as = store_credential(&store, None, "Toggl", "api_token", "secret").unwrap();
    assert_eq!(stored_as, "Toggl");
    assert_eq!(
      store.get_credential("Toggl", "api_token").unwrap().as_deref(),
      Some("secret")
    );
  }

  #[test]
  fn test_connect_rejects_unknown_type() {
    let config = config();
    assert!(connect(&MemoryStore::default(), &config.sources[2], TtlCache::disabled()).is_err());
  }

  #[test]
  fn test_entry_line() {
    let entry = Entry {
      due: Some("2024-01-01".into()),
      reference: Some("#7".into()),
      ..Entry::new("Fix bug")
    };
    assert_eq!(entry_line(&entry), "Fix bug  due 2024-01-01  #7");
    assert_eq!(entry_line(&Entry::new("Reading")), "Reading");

    let unresolved = Entry {
      project: Some("Site".into()),
      ..Entry::new("Deploy")
    };
    assert_eq!(entry_line(&unresolved), "Deploy (-/Site)  (unresolved)");
  }
}
