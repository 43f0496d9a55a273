//! Error taxonomy for the pull → cache → reconcile pipeline.
//!
//! Source-level failures abort the cycle of that source only. Entry-level and
//! cache-level failures are absorbed where they happen and only logged.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipeError {
  /// A credential required by the source is not configured.
  #[error(
    "The {credential} for {source_name} is not set. \
     Run this command and paste the secret: dontforget credential set {source_name} {credential}"
  )]
  AuthenticationMissing {
    source_name: String,
    credential: String,
  },

  /// The remote call could not be completed (network, HTTP status, auth rejected).
  #[error("{source_name} is unavailable: {reason}")]
  SourceUnavailable { source_name: String, reason: String },

  /// Resolving client/project ids for one entry failed.
  #[error("Failed to enrich entry '{entry}': {reason}")]
  EnrichmentFailed { entry: String, reason: String },

  /// A cached payload could not be read back.
  #[error("Cache record '{key}' is corrupt: {reason}")]
  CacheCorrupt { key: String, reason: String },

  /// The source configuration is unusable (unknown type, missing url, ...).
  #[error("Invalid configuration for {source_name}: {reason}")]
  InvalidConfig { source_name: String, reason: String },
}

impl PipeError {
  pub fn unavailable(source_name: &str, reason: impl std::fmt::Display) -> Self {
    Self::SourceUnavailable {
      source_name: source_name.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn missing_credential(source_name: &str, credential: &str) -> Self {
    Self::AuthenticationMissing {
      source_name: source_name.to_string(),
      credential: credential.to_string(),
    }
  }

  pub fn invalid_config(source_name: &str, reason: impl std::fmt::Display) -> Self {
    Self::InvalidConfig {
      source_name: source_name.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn is_authentication_missing(&self) -> bool {
    matches!(self, Self::AuthenticationMissing { .. })
  }
}

pub type PipeResult<T> = std::result::Result<T, PipeError>;
