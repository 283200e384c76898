//! Cache entries and snapshots.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CacheKey, ResultRecord};

/// A cached lookup result together with its creation time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint of the lookup query
    pub key: CacheKey,
    /// Lookup result
    pub value: ResultRecord,
    /// Wall-clock time the entry was inserted
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates a new entry.
    pub fn new(key: CacheKey, value: ResultRecord, created_at: DateTime<Utc>) -> Self {
        Self {
            key,
            value,
            created_at,
        }
    }

    /// Returns true once `now - created_at >= ttl`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        is_expired(self.created_at, now, ttl)
    }
}

/// Expiry rule shared by the live cache and snapshot restore.
///
/// An entry created in the future (clock moved backwards) is live. A `ttl`
/// too large to represent never expires.
pub fn is_expired(created_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => now.signed_duration_since(created_at) >= ttl,
        Err(_) => false,
    }
}

/// Point-in-time copy of the live cache entries.
///
/// Entries are ordered oldest first, ties broken by key. Only constructible
/// through [`Snapshot::from_entries`] so that order always holds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    entries: Vec<CacheEntry>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a snapshot from entries, sorting them into canonical order.
    pub fn from_entries(mut entries: Vec<CacheEntry>) -> Self {
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));
        Self { entries }
    }

    /// Returns the entries.
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Consumes the snapshot, returning its entries.
    pub fn into_entries(self) -> Vec<CacheEntry> {
        self.entries
    }

    /// Iterates the entry keys.
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.entries.iter().map(|e| &e.key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
