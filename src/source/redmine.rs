//! Redmine issues with a due date.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::{
  failed, normalize, require_project, require_token, require_url, string_field, RawRecord,
  RecordStream, Source, SourceRegistry,
};
use crate::cache::{CallSignature, TtlCache};
use crate::config::SourceConfig;
use crate::entry::Entry;
use crate::error::{PipeError, PipeResult};

pub const KIND: &str = "redmine";

const PAGE_SIZE: u64 = 100;
const FIELDS: &[&str] = &["id", "subject", "due_date", "parent", "assigned_to"];
const OPTIONAL_FIELDS: &[&str] = &["parent", "assigned_to"];

pub fn register(registry: &mut SourceRegistry) {
  registry.register(KIND, |_config, cache| Ok(Arc::new(RedmineSource::new(cache))));
}

/// One page of `GET /issues.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IssuesPage {
  #[serde(default)]
  issues: Vec<RawRecord>,
  #[serde(default)]
  total_count: u64,
}

#[derive(Debug, Clone)]
struct PageQuery {
  source_name: String,
  url: String,
  token: String,
  project: String,
}

pub struct RedmineSource {
  http: reqwest::Client,
  cache: TtlCache,
}

impl RedmineSource {
  pub fn new(cache: TtlCache) -> Self {
    Self {
      http: reqwest::Client::new(),
      cache,
    }
  }

  async fn fetch_page(&self, query: &PageQuery, offset: u64) -> PipeResult<IssuesPage> {
    let signature = CallSignature::new(format!("{}:{}", KIND, query.url), "issues.json")
      .param("project_id", &query.project)
      .param("offset", offset)
      .param("limit", PAGE_SIZE)
      .account(&query.token);

    let result = self
      .cache
      .fetch(&signature, || async {
        let endpoint = format!("{}/issues.json", query.url);
        let response = self
          .http
          .get(&endpoint)
          .header("X-Redmine-API-Key", &query.token)
          .query(&[
            ("project_id", query.project.clone()),
            ("offset", offset.to_string()),
            ("limit", PAGE_SIZE.to_string()),
          ])
          .send()
          .await
          .and_then(|r| r.error_for_status())
          .map_err(|e| PipeError::unavailable(&query.source_name, e))?;

        response
          .json::<IssuesPage>()
          .await
          .map_err(|e| PipeError::unavailable(&query.source_name, e))
      })
      .await?;

    debug!(
      offset,
      count = result.data.issues.len(),
      source = ?result.source,
      cached_at = ?result.cached_at,
      "redmine page"
    );
    Ok(result.data)
  }
}

/// Keep only the fields we use, then apply the Redmine normalization rules.
fn normalize_issue(issue: RawRecord) -> Option<RawRecord> {
  let projected: RawRecord = issue
    .into_iter()
    .filter(|(field, _)| FIELDS.contains(&field.as_str()))
    .collect();
  normalize(projected, "due_date", OPTIONAL_FIELDS, &["subject"])
}

#[async_trait]
impl Source for RedmineSource {
  fn kind(&self) -> &'static str {
    KIND
  }

  fn pull<'a>(&'a self, connection: &'a SourceConfig) -> RecordStream<'a> {
    let query = match (
      require_token(connection),
      require_url(connection),
      require_project(connection),
    ) {
      (Ok(token), Ok(url), Ok(project)) => PageQuery {
        source_name: connection.name.clone(),
        url: url.to_string(),
        token: token.to_string(),
        project: project.to_string(),
      },
      (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return failed(e),
    };

    stream::try_unfold(Some(0u64), move |offset| {
      let query = query.clone();
      async move {
        let Some(offset) = offset else {
          return Ok::<_, PipeError>(None);
        };
        let page = self.fetch_page(&query, offset).await?;
        let next = offset + page.issues.len() as u64;
        let next = if page.issues.is_empty() || next >= page.total_count {
          None
        } else {
          Some(next)
        };
        Ok(Some((stream::iter(page.issues.into_iter().map(Ok::<_, PipeError>)), next)))
      }
    })
    .try_flatten()
    .try_filter_map(|issue| async move { Ok(normalize_issue(issue)) })
    .boxed()
  }

  fn to_entry(&self, record: RawRecord) -> Option<Entry> {
    let name = string_field(&record, "subject")?;
    Some(Entry {
      due: string_field(&record, "due_date"),
      reference: string_field(&record, "id").map(|id| format!("#{}", id)),
      ..Entry::new(name)
    })
  }
}
