//! TTL cache for remote source calls.
//!
//! This module provides a source-agnostic caching mechanism that:
//! - Persists request/response pairs keyed by a call signature
//! - Checks expiry lazily on every load (no background eviction)
//! - Treats unreadable or undecodable records as misses

mod key;
mod layer;
mod storage;

pub use key::CallSignature;
pub use layer::TtlCache;
pub use storage::SqliteStorage;

#[cfg(test)]
pub use storage::{MemoryStorage, StoredRecord};
