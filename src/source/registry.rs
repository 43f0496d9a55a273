use std::collections::BTreeMap;
use std::sync::Arc;

use super::Source;
use crate::cache::TtlCache;
use crate::config::SourceConfig;
use crate::error::{PipeError, PipeResult};

/// Builds a source instance from its configuration and a cache handle.
pub type SourceConstructor = fn(&SourceConfig, TtlCache) -> PipeResult<Arc<dyn Source>>;

/// Explicit mapping from source type identifier to constructor.
#[derive(Default)]
pub struct SourceRegistry {
  constructors: BTreeMap<&'static str, SourceConstructor>,
}

impl SourceRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registry with every built-in source.
  pub fn with_defaults() -> Self {
    let mut registry = Self::new();
    super::redmine::register(&mut registry);
    super::toggl::register(&mut registry);
    super::jira::register(&mut registry);
    registry
  }

  pub fn register(&mut self, kind: &'static str, constructor: SourceConstructor) {
    self.constructors.insert(kind, constructor);
  }

  pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.constructors.keys().copied()
  }

  pub fn create(&self, config: &SourceConfig, cache: TtlCache) -> PipeResult<Arc<dyn Source>> {
    let kind = config.kind.to_lowercase();
    let constructor = self.constructors.get(kind.as_str()).ok_or_else(|| {
      let known: Vec<&str> = self.kinds().collect();
      PipeError::invalid_config(
        &config.name,
        format!(
          "unknown source type '{}' (known: {})",
          config.kind,
          known.join(", ")
        ),
      )
    })?;
    constructor(config, cache)
  }
}
