//! Sources: external systems that yield raw records.
//!
//! Every source module registers a constructor in [`SourceRegistry`]; nothing
//! is discovered at runtime.

pub mod jira;
pub mod redmine;
mod registry;
pub mod toggl;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value};
use tracing::info;

use crate::config::SourceConfig;
use crate::entry::Entry;
use crate::error::{PipeError, PipeResult};

pub use registry::SourceRegistry;

/// A record as returned by a remote API, keyed by field name.
pub type RawRecord = Map<String, Value>;

/// Lazy, finite stream of records. Not restartable: pull again instead.
pub type RecordStream<'a> = BoxStream<'a, PipeResult<RawRecord>>;

/// Capability shared by every external system.
#[async_trait]
pub trait Source: Send + Sync {
  /// Type identifier, as used in the `type` config key.
  fn kind(&self) -> &'static str;

  /// Run the remote query.
  ///
  /// Records failing the required-field filter are skipped, optional fields
  /// are present (null when missing) and free text is escaped. Missing
  /// credentials fail with `AuthenticationMissing` before any network call.
  fn pull<'a>(&'a self, connection: &'a SourceConfig) -> RecordStream<'a>;

  /// Map a normalized record to an entry, or `None` when it has no usable name.
  fn to_entry(&self, record: RawRecord) -> Option<Entry>;

  /// Resolve client/project ids.
  async fn enrich(&self, _connection: &SourceConfig, _entry: &mut Entry) -> PipeResult<()> {
    Ok(())
  }

  /// Side effect when the user picks an entry.
  async fn activate(&self, connection: &SourceConfig, entry: &Entry) -> PipeResult<()> {
    info!(
      source = %connection.name,
      entry = %entry.name,
      reference = entry.reference.as_deref().unwrap_or("-"),
      "entry activated"
    );
    Ok(())
  }
}

/// A stream that fails immediately.
pub fn failed<'a>(error: PipeError) -> RecordStream<'a> {
  stream::once(async move { Err(error) }).boxed()
}

pub fn require_token(connection: &SourceConfig) -> PipeResult<&str> {
  connection
    .api_token
    .as_deref()
    .filter(|t| !t.is_empty())
    .ok_or_else(|| PipeError::missing_credential(&connection.name, crate::credentials::API_TOKEN))
}

/// Base URL without a trailing slash; must be an absolute URL.
pub fn require_url(connection: &SourceConfig) -> PipeResult<&str> {
  let url = connection
    .url
    .as_deref()
    .map(|u| u.trim_end_matches('/'))
    .filter(|u| !u.is_empty())
    .ok_or_else(|| PipeError::invalid_config(&connection.name, "missing 'url'"))?;

  url::Url::parse(url)
    .map_err(|e| PipeError::invalid_config(&connection.name, format!("bad url '{}': {}", url, e)))?;
  Ok(url)
}

pub fn require_project(connection: &SourceConfig) -> PipeResult<&str> {
  connection
    .project_id
    .as_deref()
    .filter(|p| !p.is_empty())
    .ok_or_else(|| PipeError::invalid_config(&connection.name, "missing 'project_id'"))
}

/// Field is present and neither null nor an empty string.
pub fn has_value(record: &RawRecord, field: &str) -> bool {
  match record.get(field) {
    None | Some(Value::Null) => false,
    Some(Value::String(s)) => !s.is_empty(),
    Some(_) => true,
  }
}

/// Escape double quotes so the text survives being embedded in a quoted literal.
pub fn escape_quotes(text: &str) -> String {
  text.replace('"', "\\\"")
}

/// Shared normalization rules.
///
/// Returns `None` when `required` is missing. Every `optional` field is made
/// present, and string values of `escaped` fields get their quotes escaped.
pub fn normalize(
  mut record: RawRecord,
  required: &str,
  optional: &[&str],
  escaped: &[&str],
) -> Option<RawRecord> {
  if !has_value(&record, required) {
    return None;
  }

  for field in optional {
    record.entry(*field).or_insert(Value::Null);
  }

  for field in escaped {
    if let Some(Value::String(text)) = record.get_mut(*field) {
      *text = escape_quotes(text);
    }
  }

  Some(record)
}

/// String view of a scalar field; numbers are formatted.
pub fn string_field(record: &RawRecord, field: &str) -> Option<String> {
  match record.get(field)? {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}
