//! Jira issues with a due date, searched with JQL through `gouqi`.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::{
  failed, normalize, require_token, require_url, string_field, RawRecord, RecordStream, Source,
  SourceRegistry,
};
use crate::cache::{CallSignature, TtlCache};
use crate::config::SourceConfig;
use crate::entry::Entry;
use crate::error::{PipeError, PipeResult};

pub const KIND: &str = "jira";

pub fn register(registry: &mut SourceRegistry) {
  registry.register(KIND, |_config, cache| Ok(Arc::new(JiraSource::new(cache))));
}

#[derive(Debug, Deserialize)]
struct IssueRef {
  key: String,
}

#[derive(Debug, Deserialize)]
struct User {
  #[serde(rename = "displayName")]
  display_name: String,
}

/// One issue field, if present and shaped as `T`.
fn field<T: DeserializeOwned>(fields: &BTreeMap<String, Value>, name: &str) -> Option<T> {
  let value = fields.get(name)?;
  match serde_json::from_value(value.clone()) {
    Ok(parsed) => Some(parsed),
    Err(e) => {
      if !value.is_null() {
        debug!(field = name, error = %e, "ignoring unexpected issue field");
      }
      None
    }
  }
}

/// Flatten the interesting issue fields into a record.
///
/// Each field is read on its own; one with an unexpected shape is left out and
/// gets defaulted by the normalization step.
fn issue_record(key: &str, fields: &BTreeMap<String, Value>) -> RawRecord {
  let mut record = RawRecord::new();
  record.insert("key".into(), Value::from(key));
  if let Some(summary) = field::<String>(fields, "summary") {
    record.insert("summary".into(), Value::from(summary));
  }
  if let Some(due) = field::<String>(fields, "duedate") {
    record.insert("duedate".into(), Value::from(due));
  }
  if let Some(parent) = field::<IssueRef>(fields, "parent") {
    record.insert("parent".into(), Value::from(parent.key));
  }
  if let Some(assignee) = field::<User>(fields, "assignee") {
    record.insert("assignee".into(), Value::from(assignee.display_name));
  }
  record
}

fn normalize_issue(record: RawRecord) -> Option<RawRecord> {
  normalize(record, "duedate", &["parent", "assignee"], &["summary"])
}

/// JQL for a connection: the configured query, or the project's issues by due date.
pub fn jql(connection: &SourceConfig) -> PipeResult<String> {
  if let Some(query) = connection.query.as_deref().filter(|q| !q.trim().is_empty()) {
    return Ok(query.to_string());
  }
  let project = super::require_project(connection)?;
  Ok(format!("project = {} ORDER BY duedate ASC", project))
}

pub struct JiraSource {
  cache: TtlCache,
}

impl JiraSource {
  pub fn new(cache: TtlCache) -> Self {
    Self { cache }
  }

  async fn search(&self, connection: &SourceConfig) -> PipeResult<Vec<RawRecord>> {
    let token = require_token(connection)?;
    let email = connection
      .email
      .as_deref()
      .filter(|e| !e.is_empty())
      .ok_or_else(|| PipeError::invalid_config(&connection.name, "missing 'email'"))?;
    let url = require_url(connection)?;
    let jql = jql(connection)?;

    let signature = CallSignature::new(format!("{}:{}", KIND, url), "search")
      .param("jql", &jql)
      .param("user", email)
      .account(token);

    let result = self
      .cache
      .fetch(&signature, || async {
        let credentials = gouqi::Credentials::Basic(email.to_string(), token.to_string());
        let client = gouqi::r#async::Jira::new(url, credentials)
          .map_err(|e| PipeError::unavailable(&connection.name, e))?;

        let search = client.search();
        let options = gouqi::SearchOptions::default();
        let issues = search
          .stream(&jql, &options)
          .await
          .map_err(|e| PipeError::unavailable(&connection.name, e))?;

        Ok::<_, PipeError>(
          issues
            .map(|issue| issue_record(&issue.key, &issue.fields))
            .collect::<Vec<_>>()
            .await,
        )
      })
      .await?;

    debug!(source = %connection.name, count = result.data.len(), from = ?result.source, cached_at = ?result.cached_at, "jira search");
    Ok(result.data)
  }
}

#[async_trait]
impl Source for JiraSource {
  fn kind(&self) -> &'static str {
    KIND
  }

  fn pull<'a>(&'a self, connection: &'a SourceConfig) -> RecordStream<'a> {
    if let Err(e) = require_token(connection) {
      return failed(e);
    }

    stream::once(self.search(connection))
      .map_ok(|records| stream::iter(records.into_iter().map(Ok::<_, PipeError>)))
      .try_flatten()
      .try_filter_map(|record| async move { Ok(normalize_issue(record)) })
      .boxed()
  }

  fn to_entry(&self, record: RawRecord) -> Option<Entry> {
    let name = string_field(&record, "summary")?;
    Some(Entry {
      due: string_field(&record, "duedate"),
      reference: string_field(&record, "key"),
      ..Entry::new(name)
    })
  }
}
