//! Toggl Track: configured entries, resolved against the workspace catalog.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{failed, normalize, require_token, string_field, RawRecord, RecordStream, Source, SourceRegistry};
use crate::cache::{CallSignature, TtlCache};
use crate::config::SourceConfig;
use crate::entry::Entry;
use crate::error::{PipeError, PipeResult};

pub const KIND: &str = "toggl";
pub const DEFAULT_URL: &str = "https://api.track.toggl.com/api/v9";

/// Password Toggl expects when the API token is the basic auth user.
const TOKEN_PASSWORD: &str = "api_token";

pub fn register(registry: &mut SourceRegistry) {
  registry.register(KIND, |_config, cache| Ok(Arc::new(TogglSource::new(cache))));
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Me {
  default_workspace_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Client {
  id: i64,
  name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Project {
  id: i64,
  name: String,
  #[serde(default, alias = "cid")]
  client_id: Option<i64>,
}

/// Clients and projects of one workspace.
#[derive(Debug, Clone, Default)]
struct Catalog {
  clients: Vec<Client>,
  projects: Vec<Project>,
}

impl Catalog {
  /// Find the project by name, inside the named client when one is given.
  fn resolve(&self, client: Option<&str>, project: &str) -> Result<(Option<i64>, i64), String> {
    let client_id = match client {
      Some(name) => Some(
        self
          .clients
          .iter()
          .find(|c| c.name == name)
          .map(|c| c.id)
          .ok_or_else(|| format!("client '{}' not found", name))?,
      ),
      None => None,
    };

    self
      .projects
      .iter()
      .find(|p| p.name == project && (client_id.is_none() || p.client_id == client_id))
      .map(|p| (p.client_id, p.id))
      .ok_or_else(|| match client {
        Some(client) => format!("project '{}' not found for client '{}'", project, client),
        None => format!("project '{}' not found", project),
      })
  }
}

/// Authenticated view of one Toggl connection.
struct Session<'a> {
  connection: &'a SourceConfig,
  base_url: String,
  token: String,
}

pub struct TogglSource {
  http: reqwest::Client,
  cache: TtlCache,
  /// Serializes catalog lookups so concurrent enrichment hits the cache
  catalog_lock: Mutex<()>,
}

impl TogglSource {
  pub fn new(cache: TtlCache) -> Self {
    Self {
      http: reqwest::Client::new(),
      cache,
      catalog_lock: Mutex::new(()),
    }
  }

  fn session<'a>(&self, connection: &'a SourceConfig) -> PipeResult<Session<'a>> {
    let token = require_token(connection)?.to_string();
    let base_url = connection
      .url
      .as_deref()
      .filter(|u| !u.is_empty())
      .unwrap_or(DEFAULT_URL)
      .trim_end_matches('/')
      .to_string();
    Ok(Session {
      connection,
      base_url,
      token,
    })
  }

  /// Cached `GET` of a JSON document below the API root.
  async fn get<T>(&self, session: &Session<'_>, path: &str) -> PipeResult<T>
  where
    T: Serialize + DeserializeOwned,
  {
    let source_name = &session.connection.name;
    let signature =
      CallSignature::new(format!("{}:{}", KIND, session.base_url), path).account(&session.token);

    let result = self
      .cache
      .fetch(&signature, || async {
        self
          .http
          .get(format!("{}/{}", session.base_url, path))
          .basic_auth(&session.token, Some(TOKEN_PASSWORD))
          .send()
          .await
          .and_then(|r| r.error_for_status())
          .map_err(|e| PipeError::unavailable(source_name, e))?
          .json::<T>()
          .await
          .map_err(|e| PipeError::unavailable(source_name, e))
      })
      .await?;

    debug!(source = %source_name, path, from = ?result.source, cached_at = ?result.cached_at, "toggl call");
    Ok(result.data)
  }

  async fn workspace_id(&self, session: &Session<'_>) -> PipeResult<u64> {
    if let Some(id) = session.connection.workspace_id {
      return Ok(id);
    }
    let me: Me = self.get(session, "me").await?;
    Ok(me.default_workspace_id)
  }

  async fn catalog(&self, session: &Session<'_>) -> PipeResult<Catalog> {
    let _guard = self.catalog_lock.lock().await;
    let workspace = self.workspace_id(session).await?;

    // Toggl answers `null` instead of `[]` for a workspace without clients.
    let clients: Option<Vec<Client>> = self
      .get(session, &format!("workspaces/{}/clients", workspace))
      .await?;
    let projects: Option<Vec<Project>> = self
      .get(session, &format!("workspaces/{}/projects", workspace))
      .await?;

    Ok(Catalog {
      clients: clients.unwrap_or_default(),
      projects: projects.unwrap_or_default(),
    })
  }
}

#[async_trait]
impl Source for TogglSource {
  fn kind(&self) -> &'static str {
    KIND
  }

  /// Configured entries, last declared first.
  fn pull<'a>(&'a self, connection: &'a SourceConfig) -> RecordStream<'a> {
    if let Err(e) = require_token(connection) {
      return failed(e);
    }

    let records: Vec<PipeResult<RawRecord>> = connection
      .entries
      .iter()
      .rev()
      .filter_map(|entry| match serde_json::to_value(entry) {
        Ok(serde_json::Value::Object(record)) => Some(record),
        _ => None,
      })
      .filter_map(|record| normalize(record, "name", &["client", "project"], &[]))
      .map(Ok)
      .collect();

    stream::iter(records).boxed()
  }

  fn to_entry(&self, record: RawRecord) -> Option<Entry> {
    let name = string_field(&record, "name")?;
    Some(Entry {
      client: string_field(&record, "client"),
      project: string_field(&record, "project"),
      ..Entry::new(name)
    })
  }

  async fn enrich(&self, connection: &SourceConfig, entry: &mut Entry) -> PipeResult<()> {
    let Some(project) = entry.project.clone() else {
      debug!(entry = %entry.name, "no project configured, nothing to resolve");
      return Ok(());
    };

    let unresolved = |reason: String| PipeError::EnrichmentFailed {
      entry: entry.name.clone(),
      reason,
    };

    let session = self.session(connection)?;
    let catalog = self
      .catalog(&session)
      .await
      .map_err(|e| unresolved(e.to_string()))?;
    let (client_id, project_id) = catalog
      .resolve(entry.client.as_deref(), &project)
      .map_err(unresolved)?;

    entry.client_id = client_id;
    entry.project_id = Some(project_id);
    Ok(())
  }

  /// Start a running time entry.
  async fn activate(&self, connection: &SourceConfig, entry: &Entry) -> PipeResult<()> {
    let session = self.session(connection)?;
    let workspace = self.workspace_id(&session).await?;

    let body = json!({
      "description": entry.name,
      "project_id": entry.project_id,
      "workspace_id": workspace,
      "created_with": env!("CARGO_PKG_NAME"),
      "start": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
      "duration": -1,
    });

    self
      .http
      .post(format!("{}/workspaces/{}/time_entries", session.base_url, workspace))
      .basic_auth(&session.token, Some(TOKEN_PASSWORD))
      .json(&body)
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| PipeError::unavailable(&connection.name, e))?;

    info!(source = %connection.name, entry = %entry.name, "started time entry");
    Ok(())
  }
}
