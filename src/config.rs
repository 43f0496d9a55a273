use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub sources: Vec<SourceConfig>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Set to false to always hit the remote APIs
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Seconds before a cached response must be fetched again
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      ttl_secs: default_ttl_secs(),
    }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.ttl_secs as i64)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
  /// Delay before the first pull, so startup work is not slowed down
  #[serde(default = "default_initial_delay_secs")]
  pub initial_delay_secs: u64,
  #[serde(default = "default_interval_secs")]
  pub interval_secs: u64,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      initial_delay_secs: default_initial_delay_secs(),
      interval_secs: default_interval_secs(),
    }
  }
}

impl SchedulerConfig {
  pub fn initial_delay(&self) -> Duration {
    Duration::from_secs(self.initial_delay_secs)
  }

  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs.max(1))
  }
}

fn default_true() -> bool {
  true
}

fn default_ttl_secs() -> u64 {
  60 * 60
}

fn default_initial_delay_secs() -> u64 {
  5
}

fn default_interval_secs() -> u64 {
  10 * 60
}

/// Connection info for one source instance.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
  /// Unique name, also used as the menu section and credential namespace
  pub name: String,
  /// Source type identifier: redmine, toggl or jira
  #[serde(rename = "type")]
  pub kind: String,
  pub url: Option<String>,
  /// Redmine project identifier or Jira project key
  pub project_id: Option<String>,
  /// Jira account email (basic auth user)
  pub email: Option<String>,
  /// Toggl workspace; resolved from the account when absent
  pub workspace_id: Option<u64>,
  /// Custom JQL for Jira sources
  pub query: Option<String>,
  /// Usually filled from the credential store, not from the file
  #[serde(default)]
  pub api_token: Option<String>,
  /// Configured entries (Toggl)
  #[serde(default)]
  pub entries: Vec<EntryConfig>,
}

/// An entry declared in the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryConfig {
  pub name: String,
  pub client: Option<String>,
  pub project: Option<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./dontforget.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/dontforget/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/dontforget/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("dontforget.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("dontforget").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    let mut seen = BTreeSet::new();
    for source in &self.sources {
      if source.name.trim().is_empty() {
        return Err(eyre!("Every source needs a non-empty name"));
      }
      if !seen.insert(source.name.as_str()) {
        return Err(eyre!("Duplicate source name: {}", source.name));
      }
    }
    Ok(())
  }

  /// Find a source by name (case-insensitive).
  pub fn source(&self, name: &str) -> Option<&SourceConfig> {
    self
      .sources
      .iter()
      .find(|s| s.name.eq_ignore_ascii_case(name))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = r#"
sources:
  - name: Redmine
    type: redmine
    url: https://redmine.example.com
    project_id: ops
  - name: Toggl
    type: toggl
    workspace_id: 42
    entries:
      - name: Standup
        client: Acme
        project: Meetings
      - name: Reading
cache:
  ttl_secs: 120
"#;

  #[test]
  fn test_parse_sources_and_defaults() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    assert_eq!(config.sources.len(), 2);
    assert_eq!(config.sources[0].kind, "redmine");
    assert_eq!(config.sources[0].project_id.as_deref(), Some("ops"));
    assert_eq!(config.sources[1].workspace_id, Some(42));
    assert_eq!(config.sources[1].entries.len(), 2);
    assert_eq!(config.sources[1].entries[1].client, None);

    assert!(config.cache.enabled);
    assert_eq!(config.cache.ttl_secs, 120);
    assert_eq!(config.scheduler.initial_delay_secs, 5);
    assert_eq!(config.scheduler.interval_secs, 600);
  }

  #[test]
  fn test_api_token_is_not_required_in_file() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    assert!(config.sources.iter().all(|s| s.api_token.is_none()));
  }

  #[test]
  fn test_duplicate_source_names_rejected() {
    let yaml = r#"
sources:
  - name: Toggl
    type: toggl
  - name: Toggl
    type: toggl
"#;
    assert!(Config::from_yaml(yaml).is_err());
  }

  #[test]
  fn test_source_lookup_is_case_insensitive() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    assert_eq!(config.source("toggl").map(|s| s.kind.as_str()), Some("toggl"));
    assert!(config.source("jira").is_none());
  }

  #[test]
  fn test_empty_file_uses_defaults() {
    let config = Config::from_yaml("{}").unwrap();
    assert!(config.sources.is_empty());
    assert_eq!(config.cache.ttl_secs, 3600);
  }
}
