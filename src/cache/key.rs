//! Deterministic call signatures used as cache keys.

use sha2::{Digest, Sha256};

/// Identity of one remote call: which source, which endpoint, which parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSignature {
  source: String,
  path: String,
  params: Vec<(String, String)>,
}

impl CallSignature {
  /// `source` should identify the remote system instance (type + base url),
  /// not the user-facing source name, so renaming a source keeps its cache.
  pub fn new(source: impl Into<String>, path: impl Into<String>) -> Self {
    Self {
      source: source.into(),
      path: path.into(),
      params: Vec::new(),
    }
  }

  pub fn param(mut self, name: &str, value: impl ToString) -> Self {
    self.params.push((name.to_string(), value.to_string()));
    self
  }

  /// Scope the call to the account behind `secret`. Only a short digest of
  /// the secret ends up in the key and the description.
  pub fn account(self, secret: &str) -> Self {
    let digest = hex::encode(Sha256::digest(secret.as_bytes()));
    self.param("account", &digest[..16])
  }

  /// Stable, fixed-length storage key.
  ///
  /// Parameters are sorted so the order in which they were added does not matter.
  pub fn cache_hash(&self) -> String {
    let mut params = self.params.clone();
    params.sort();

    let mut hasher = Sha256::new();
    hasher.update(self.source.as_bytes());
    hasher.update([0]);
    hasher.update(self.path.as_bytes());
    for (name, value) in &params {
      hasher.update([0]);
      hasher.update(name.as_bytes());
      hasher.update(b"=");
      hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
  }

  /// Human-readable form for logs and the cache table.
  pub fn description(&self) -> String {
    if self.params.is_empty() {
      format!("{} {}", self.source, self.path)
    } else {
      let params: Vec<String> = self
        .params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
      format!("{} {}?{}", self.source, self.path, params.join("&"))
    }
  }
}
