//! Entries and the name-keyed registry built from one pull.

use futures::future::join_all;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::error::PipeResult;
use crate::source::Source;

/// One pulled unit of work or time-tracking target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
  pub name: String,
  pub client: Option<String>,
  pub client_id: Option<i64>,
  pub project: Option<String>,
  pub project_id: Option<i64>,
  /// Due date as reported by the tracker
  pub due: Option<String>,
  /// Remote identifier (issue id or key)
  pub reference: Option<String>,
}

impl Entry {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }

  /// Menu label: `name (client/project)` when either is known.
  pub fn label(&self) -> String {
    match (&self.client, &self.project) {
      (None, None) => self.name.clone(),
      (client, project) => format!(
        "{} ({}/{})",
        self.name,
        client.as_deref().unwrap_or("-"),
        project.as_deref().unwrap_or("-")
      ),
    }
  }

  /// Whether client/project ids have been resolved.
  pub fn is_resolved(&self) -> bool {
    self.project_id.is_some()
  }
}

/// Insertion-ordered mapping of entry name to entry.
///
/// Inserting a name twice keeps the first position and the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryRegistry {
  entries: Vec<Entry>,
  index: HashMap<String, usize>,
}

impl EntryRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert or replace by name, returning the replaced entry.
  pub fn insert(&mut self, entry: Entry) -> Option<Entry> {
    match self.index.get(&entry.name) {
      Some(&position) => Some(std::mem::replace(&mut self.entries[position], entry)),
      None => {
        self.index.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
        None
      }
    }
  }

  pub fn get(&self, name: &str) -> Option<&Entry> {
    self.index.get(name).map(|&position| &self.entries[position])
  }

  #[cfg(test)]
  pub fn contains(&self, name: &str) -> bool {
    self.index.contains_key(name)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Entry> {
    self.entries.iter()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|e| e.name.as_str())
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Pull from `source`, normalize every record and enrich the result.
  ///
  /// Source failures abort the build. Enrichment failures are logged and the
  /// entry is kept unresolved.
  pub async fn build(source: &dyn Source, connection: &SourceConfig) -> PipeResult<Self> {
    let mut registry = Self::new();

    let mut records = source.pull(connection);
    while let Some(record) = records.try_next().await? {
      match source.to_entry(record) {
        Some(entry) => {
          if let Some(previous) = registry.insert(entry) {
            debug!(source = %connection.name, name = %previous.name, "duplicate entry, keeping the last one");
          }
        }
        None => debug!(source = %connection.name, "skipping record without a usable name"),
      }
    }
    drop(records);

    registry.enrich(source, connection).await;
    Ok(registry)
  }

  async fn enrich(&mut self, source: &dyn Source, connection: &SourceConfig) {
    let results = join_all(
      self
        .entries
        .iter_mut()
        .map(|entry| source.enrich(connection, entry)),
    )
    .await;

    for result in results {
      if let Err(e) = result {
        warn!(source = %connection.name, error = %e, "entry left unresolved");
      }
    }
  }
}

impl FromIterator<Entry> for EntryRegistry {
  fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
    let mut registry = Self::new();
    for entry in iter {
      registry.insert(entry);
    }
    registry
  }
}

impl IntoIterator for EntryRegistry {
  type Item = Entry;
  type IntoIter = std::vec::IntoIter<Entry>;

  fn into_iter(self) -> Self::IntoIter {
    self.entries.into_iter()
  }
}
