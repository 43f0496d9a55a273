//! Credential lookup for sources.
//!
//! Secrets are looked up per `(source name, credential name)`. Environment
//! variables win over the OS keyring so CI and one-off runs do not need a
//! keyring daemon.

use color_eyre::{eyre::eyre, Result};
use tracing::{debug, warn};

use crate::config::SourceConfig;

/// Name of the API token credential every source uses.
pub const API_TOKEN: &str = "api_token";

const KEYRING_SERVICE_PREFIX: &str = "dontforget";

/// Storage surface for source secrets.
pub trait CredentialStore: Send + Sync {
  /// Returns `Ok(None)` when the credential is simply not set.
  fn get_credential(&self, source_name: &str, credential_name: &str) -> Result<Option<String>>;

  fn set_credential(&self, source_name: &str, credential_name: &str, secret: &str) -> Result<()>;
}

/// Environment variable name for a credential, e.g. `DONTFORGET_TOGGL_API_TOKEN`.
pub fn env_var_name(source_name: &str, credential_name: &str) -> String {
  let sanitize = |s: &str| {
    s.chars()
      .map(|c| {
        if c.is_ascii_alphanumeric() {
          c.to_ascii_uppercase()
        } else {
          '_'
        }
      })
      .collect::<String>()
  };
  format!(
    "DONTFORGET_{}_{}",
    sanitize(source_name),
    sanitize(credential_name)
  )
}

/// Read-only store backed by environment variables.
#[derive(Default)]
pub struct EnvStore;

impl CredentialStore for EnvStore {
  fn get_credential(&self, source_name: &str, credential_name: &str) -> Result<Option<String>> {
    let value = std::env::var(env_var_name(source_name, credential_name))
      .ok()
      .filter(|v| !v.is_empty());
    Ok(value)
  }

  fn set_credential(&self, source_name: &str, credential_name: &str, _secret: &str) -> Result<()> {
    Err(eyre!(
      "Environment credentials are read-only; export {} instead",
      env_var_name(source_name, credential_name)
    ))
  }
}

/// OS keyring store (Secret Service, Keychain, Credential Manager).
#[derive(Default)]
pub struct KeyringStore;

impl KeyringStore {
  fn entry(source_name: &str, credential_name: &str) -> Result<keyring::Entry> {
    let service = format!("{}.{}", KEYRING_SERVICE_PREFIX, source_name);
    keyring::Entry::new(&service, credential_name)
      .map_err(|e| eyre!("Failed to create keyring entry: {}", e))
  }
}

impl CredentialStore for KeyringStore {
  fn get_credential(&self, source_name: &str, credential_name: &str) -> Result<Option<String>> {
    match Self::entry(source_name, credential_name)?.get_password() {
      Ok(secret) => Ok(Some(secret)),
      Err(keyring::Error::NoEntry) => Ok(None),
      Err(e) => Err(eyre!("Failed to read credential from keyring: {}", e)),
    }
  }

  fn set_credential(&self, source_name: &str, credential_name: &str, secret: &str) -> Result<()> {
    Self::entry(source_name, credential_name)?
      .set_password(secret)
      .map_err(|e| eyre!("Failed to store credential in keyring: {}", e))
  }
}

/// Environment first, then keyring. Writes go to the keyring.
#[derive(Default)]
pub struct DefaultStore {
  env: EnvStore,
  keyring: KeyringStore,
}

impl CredentialStore for DefaultStore {
  fn get_credential(&self, source_name: &str, credential_name: &str) -> Result<Option<String>> {
    if let Some(secret) = self.env.get_credential(source_name, credential_name)? {
      debug!(source = source_name, credential = credential_name, "credential from environment");
      return Ok(Some(secret));
    }
    self.keyring.get_credential(source_name, credential_name)
  }

  fn set_credential(&self, source_name: &str, credential_name: &str, secret: &str) -> Result<()> {
    self
      .keyring
      .set_credential(source_name, credential_name, secret)
  }
}

/// Fill `api_token` from the store unless the config file already set it.
///
/// A store failure is logged and treated as an absent credential; the source
/// then reports `AuthenticationMissing` when it is pulled.
pub fn resolve_api_token(store: &dyn CredentialStore, source: &SourceConfig) -> SourceConfig {
  let mut resolved = source.clone();
  if resolved.api_token.is_none() {
    resolved.api_token = match store.get_credential(&source.name, API_TOKEN) {
      Ok(token) => token,
      Err(e) => {
        warn!(source = %source.name, error = %e, "credential lookup failed");
        None
      }
    };
  }
  resolved
}


#[cfg(test)]
mod tests {
  use super::testing::MemoryStore;
  use super::*;

  fn source(name: &str) -> SourceConfig {
    SourceConfig {
      name: name.to_string(),
      kind: "toggl".to_string(),
      ..Default::default()
    }
  }

  #[test]
  fn test_env_var_name() {
    assert_eq!(
      env_var_name("Toggl", API_TOKEN),
      "DONTFORGET_TOGGL_API_TOKEN"
    );
    assert_eq!(
      env_var_name("my redmine", "api-token"),
      "DONTFORGET_MY_REDMINE_API_TOKEN"
    );
  }

  #[test]
  fn test_env_store_reads_variable() {
    std::env::set_var("DONTFORGET_ENVSTORETEST_API_TOKEN", "s3cret");
    let secret = EnvStore.get_credential("EnvStoreTest", API_TOKEN).unwrap();
    assert_eq!(secret.as_deref(), Some("s3cret"));
    assert!(EnvStore
      .get_credential("NobodySetThis", API_TOKEN)
      .unwrap()
      .is_none());
  }

  #[test]
  fn test_resolve_api_token_from_store() {
    let store = MemoryStore::default();
    store.set_credential("Toggl", API_TOKEN, "abc").unwrap();

    let resolved = resolve_api_token(&store, &source("Toggl"));
    assert_eq!(resolved.api_token.as_deref(), Some("abc"));

    let missing = resolve_api_token(&store, &source("Redmine"));
    assert!(missing.api_token.is_none());
  }

  #[test]
  fn test_resolve_api_token_keeps_configured_token() {
    let store = MemoryStore::default();
    store.set_credential("Toggl", API_TOKEN, "from-store").unwrap();

    let mut configured = source("Toggl");
    configured.api_token = Some("from-file".to_string());
    let resolved = resolve_api_token(&store, &configured);
    assert_eq!(resolved.api_token.as_deref(), Some("from-file"));
  }
}
