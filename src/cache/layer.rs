//! Cache layer that puts a TTL policy in front of remote calls.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::key::CallSignature;
use super::storage::{CacheStorage, NoopStorage};
use crate::error::{PipeError, PipeResult};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A cached response that is still within its TTL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
  pub payload: Vec<u8>,
  pub written_at: DateTime<Utc>,
}

/// Indicates where fetched data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still within TTL
  Cache,
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

/// TTL cache over a key-value storage.
///
/// Expiry is checked on every load against the injected clock; nothing is ever
/// evicted in the background. Clones share the same storage.
#[derive(Clone)]
pub struct TtlCache {
  storage: Arc<dyn CacheStorage>,
  ttl: Duration,
  clock: Clock,
}

impl TtlCache {
  /// Create a new cache with the given storage backend and a one hour TTL.
  pub fn new(storage: impl CacheStorage + 'static) -> Self {
    Self {
      storage: Arc::new(storage),
      ttl: Duration::hours(1),
      clock: Arc::new(Utc::now),
    }
  }

  /// A cache that never hits.
  pub fn disabled() -> Self {
    Self::new(NoopStorage)
  }

  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  #[cfg(test)]
  pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
    self.clock = Arc::new(clock);
    self
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  fn now(&self) -> DateTime<Utc> {
    (self.clock)()
  }

  fn is_expired(&self, written_at: DateTime<Utc>) -> bool {
    self.now() - written_at > self.ttl
  }

  /// Load a record if it exists and is within the TTL.
  ///
  /// Storage failures are logged and reported as a miss.
  pub fn load(&self, key: &CallSignature) -> Option<CacheRecord> {
    let stored = match self.storage.read(&key.cache_hash()) {
      Ok(stored) => stored?,
      Err(e) => {
        let err = PipeError::CacheCorrupt {
          key: key.description(),
          reason: e.to_string(),
        };
        warn!(error = %err, "treating unreadable cache record as a miss");
        return None;
      }
    };

    if self.is_expired(stored.written_at) {
      debug!(call = %key.description(), written_at = %stored.written_at, "cache record expired");
      return None;
    }

    Some(CacheRecord {
      payload: stored.payload,
      written_at: stored.written_at,
    })
  }

  /// Overwrite the record for `key`, stamped with the current time.
  ///
  /// A failed write only costs a future network call, so it is logged, not returned.
  pub fn save(&self, key: &CallSignature, payload: &[u8]) {
    let now = self.now();
    if let Err(e) = self
      .storage
      .write(&key.cache_hash(), &key.description(), payload, now)
    {
      warn!(call = %key.description(), error = %e, "failed to write cache record");
    }
  }

  /// Drop the record for one call.
  pub fn invalidate(&self, key: &CallSignature) -> color_eyre::Result<()> {
    self.storage.remove(&key.cache_hash())
  }

  /// Drop every record.
  pub fn clear(&self) -> color_eyre::Result<usize> {
    self.storage.clear()
  }

  /// Cache-first fetch.
  ///
  /// 1. Load - if present and within TTL, decode and return it
  /// 2. Otherwise call the fetcher; its errors propagate and nothing is saved
  /// 3. Save the fresh result
  pub async fn fetch<T, F, Fut>(&self, key: &CallSignature, fetcher: F) -> PipeResult<CacheResult<T>>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = PipeResult<T>>,
  {
    if let Some(record) = self.load(key) {
      match serde_json::from_slice::<T>(&record.payload) {
        Ok(data) => {
          debug!(call = %key.description(), "cache hit");
          return Ok(CacheResult {
            data,
            source: CacheSource::Cache,
            cached_at: Some(record.written_at),
          });
        }
        Err(e) => {
          let err = PipeError::CacheCorrupt {
            key: key.description(),
            reason: e.to_string(),
          };
          warn!(error = %err, "treating undecodable cache record as a miss");
          if let Err(e) = self.invalidate(key) {
            warn!(call = %key.description(), error = %e, "failed to drop corrupt cache record");
          }
        }
      }
    }

    debug!(call = %key.description(), "cache miss, calling remote");
    let data = fetcher().await?;

    match serde_json::to_vec(&data) {
      Ok(payload) => self.save(key, &payload),
      Err(e) => warn!(call = %key.description(), error = %e, "failed to serialize response"),
    }

    Ok(CacheResult {
      data,
      source: CacheSource::Network,
      cached_at: None,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use chrono::TimeZone;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  /// A cache over shared in-memory storage with a manually driven clock.
  fn cache_with_clock(ttl: Duration) -> (TtlCache, Arc<Mutex<DateTime<Utc>>>, Arc<MemoryStorage>) {
    let now = Arc::new(Mutex::new(
      Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    ));
    let storage = Arc::new(MemoryStorage::default());
    let clock = now.clone();
    let cache = TtlCache::new(storage.clone())
      .with_ttl(ttl)
      .with_clock(move || *clock.lock().unwrap());
    (cache, now, storage)
  }

  struct BrokenStorage;

  impl CacheStorage for BrokenStorage {
    fn read(&self, _key: &str) -> color_eyre::Result<Option<crate::cache::StoredRecord>> {
      Err(color_eyre::eyre::eyre!("disk on fire"))
    }
    fn write(&self, _: &str, _: &str, _: &[u8], _: DateTime<Utc>) -> color_eyre::Result<()> {
      Err(color_eyre::eyre::eyre!("disk on fire"))
    }
    fn remove(&self, _key: &str) -> color_eyre::Result<()> {
      Ok(())
    }
    fn clear(&self) -> color_eyre::Result<usize> {
      Ok(0)
    }
  }

  fn counting_fetch(
    counter: &AtomicUsize,
    value: u32,
  ) -> impl Future<Output = PipeResult<Vec<u32>>> + '_ {
    async move {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok(vec![value])
    }
  }

  #[test]
  fn test_load_respects_ttl_boundaries() {
    let ttl = Duration::seconds(600);
    let (cache, now, _storage) = cache_with_clock(ttl);
    let key = CallSignature::new("toggl", "clients");
    let t0 = *now.lock().unwrap();

    cache.save(&key, b"[1]");

    *now.lock().unwrap() = t0 + ttl - Duration::seconds(1);
    let record = cache.load(&key).expect("record within TTL");
    assert_eq!(record.payload, b"[1]");
    assert_eq!(record.written_at, t0);

    *now.lock().unwrap() = t0 + ttl;
    assert!(cache.load(&key).is_some(), "exactly TTL old is still valid");

    *now.lock().unwrap() = t0 + ttl + Duration::seconds(1);
    assert!(cache.load(&key).is_none());
  }

  #[tokio::test]
  async fn test_fetch_reinvokes_source_after_expiry() {
    let ttl = Duration::seconds(60);
    let (cache, now, _storage) = cache_with_clock(ttl);
    let key = CallSignature::new("redmine", "issues.json");
    let calls = AtomicUsize::new(0);
    let t0 = *now.lock().unwrap();

    let first = cache.fetch(&key, || counting_fetch(&calls, 1)).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.data, vec![1]);

    *now.lock().unwrap() = t0 + ttl - Duration::seconds(1);
    let second = cache.fetch(&key, || counting_fetch(&calls, 2)).await.unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.data, vec![1]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    *now.lock().unwrap() = t0 + ttl + Duration::seconds(1);
    let third = cache.fetch(&key, || counting_fetch(&calls, 3)).await.unwrap();
    assert_eq!(third.source, CacheSource::Network);
    assert_eq!(third.data, vec![3]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_save_restamps_record() {
    let ttl = Duration::seconds(60);
    let (cache, now, _storage) = cache_with_clock(ttl);
    let key = CallSignature::new("toggl", "me");
    let t0 = *now.lock().unwrap();

    cache.save(&key, b"\"old\"");
    *now.lock().unwrap() = t0 + Duration::seconds(50);
    cache.save(&key, b"\"new\"");

    *now.lock().unwrap() = t0 + Duration::seconds(100);
    let record = cache.load(&key).expect("rewritten record is fresh");
    assert_eq!(record.payload, b"\"new\"");
  }

  #[tokio::test]
  async fn test_corrupt_payload_is_a_miss() {
    let (cache, _now, storage) = cache_with_clock(Duration::seconds(60));
    let key = CallSignature::new("toggl", "projects");
    storage.insert_raw(&key.cache_hash(), b"{not json", cache.now());

    let calls = AtomicUsize::new(0);
    let result = cache.fetch(&key, || counting_fetch(&calls, 7)).await.unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data, vec![7]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The corrupt record was dropped and replaced with the fresh response.
    let again = cache.fetch(&key, || counting_fetch(&calls, 8)).await.unwrap();
    assert_eq!(again.data, vec![7]);
  }

  #[tokio::test]
  async fn test_unreadable_storage_does_not_fail_fetch() {
    let cache = TtlCache::new(BrokenStorage);
    let key = CallSignature::new("jira", "search");
    let calls = AtomicUsize::new(0);

    let result = cache.fetch(&key, || counting_fetch(&calls, 1)).await.unwrap();
    assert_eq!(result.data, vec![1]);
    assert!(cache.load(&key).is_none());
  }

  #[tokio::test]
  async fn test_fetch_error_propagates_and_is_not_cached() {
    let (cache, _now, storage) = cache_with_clock(Duration::seconds(60));
    let key = CallSignature::new("redmine", "issues.json");

    let result: PipeResult<CacheResult<Vec<u32>>> = cache
      .fetch(&key, || async { Err(PipeError::unavailable("Redmine", "timeout")) })
      .await;
    assert!(matches!(result, Err(PipeError::SourceUnavailable { .. })));
    assert_eq!(storage.len(), 0);
  }

  #[tokio::test]
  async fn test_invalidate_forces_refetch() {
    let (cache, _now, _storage) = cache_with_clock(Duration::seconds(60));
    let key = CallSignature::new("toggl", "clients");
    let calls = AtomicUsize::new(0);

    cache.fetch(&key, || counting_fetch(&calls, 1)).await.unwrap();
    cache.invalidate(&key).unwrap();
    cache.fetch(&key, || counting_fetch(&calls, 2)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_disabled_cache_always_calls_remote() {
    let cache = TtlCache::disabled();
    let key = CallSignature::new("toggl", "clients");
    let calls = AtomicUsize::new(0);

    cache.fetch(&key, || counting_fetch(&calls, 1)).await.unwrap();
    cache.fetch(&key, || counting_fetch(&calls, 1)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }
}
