//! Cached directory lookups.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use dircache_cache::{CacheStats, ResultCache};
use dircache_core::config::{CacheConfig, LookupSettings};
use dircache_core::constants::{STATUS_TAG_ERROR, STATUS_TAG_NOT_FOUND, STATUS_TAG_OK};
use dircache_core::error::Result;
use dircache_core::traits::{DirectoryClient, SearchResult};
use dircache_core::types::{CacheKey, ResultRecord};
use dircache_crypto::LookupQuery;
use dircache_persist::{FileStore, LoadOutcome, PersistenceScheduler, SchedulerHandle, SchedulerStats};

/// How a directory search ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookupStatus {
    /// The object was found
    Ok,
    /// No object matched
    NotFound,
    /// The search failed
    Error,
}

impl LookupStatus {
    /// Event tag for this status.
    pub fn tag(&self) -> &'static str {
        match self {
            LookupStatus::Ok => STATUS_TAG_OK,
            LookupStatus::NotFound => STATUS_TAG_NOT_FOUND,
            LookupStatus::Error => STATUS_TAG_ERROR,
        }
    }

    /// Returns true for anything other than `Ok`.
    pub fn is_failure(&self) -> bool {
        !matches!(self, LookupStatus::Ok)
    }
}

impl fmt::Display for LookupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Result of [`LookupOrchestrator::lookup`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupOutcome {
    /// Attributes to merge into the event
    pub record: ResultRecord,
    /// Search status; `None` when served from cache
    pub status: Option<LookupStatus>,
    /// Whether the record came from the cache
    pub from_cache: bool,
}

impl LookupOutcome {
    /// Tag to add to the event, if the lookup failed.
    ///
    /// Cache hits never carry a tag.
    pub fn failure_tag(&self) -> Option<&'static str> {
        self.status.filter(LookupStatus::is_failure).map(|s| s.tag())
    }
}

/// Fingerprint, check the cache, search on a miss, store the result.
///
/// With a `persist_path` configured, [`start`](Self::start) restores the last
/// snapshot and runs a background scheduler until [`shutdown`](Self::shutdown).
pub struct LookupOrchestrator {
    settings: LookupSettings,
    client: Arc<dyn DirectoryClient>,
    cache: Option<Arc<ResultCache>>,
    scheduler: Option<SchedulerHandle>,
}

impl LookupOrchestrator {
    /// Builds the cache, restores persisted entries, and starts persistence.
    ///
    /// A missing or unreadable snapshot is not fatal: the cache starts empty
    /// and the problem is logged.
    ///
    /// # Errors
    /// Returns a configuration error for invalid settings.
    pub async fn start(
        settings: LookupSettings,
        cache_config: CacheConfig,
        client: Arc<dyn DirectoryClient>,
    ) -> Result<Self> {
        settings.validate()?;
        cache_config.validate()?;

        if !cache_config.use_cache {
            info!(host = %settings.host, "Lookup cache disabled");
            return Ok(Self {
                settings,
                client,
                cache: None,
                scheduler: None,
            });
        }

        let cache = Arc::new(ResultCache::from_config(&cache_config)?);
        info!(
            max_entries = cache_config.max_entries,
            ttl_secs = cache_config.ttl_seconds,
            "Lookup cache enabled"
        );

        let scheduler = match &cache_config.persist_path {
            Some(path) if cache_config.persistence_enabled() => {
                let interval = cache_config.persist_interval()?;
                let store = Arc::new(FileStore::new(path));

                match store.load().await {
                    Ok(LoadOutcome::Loaded(snapshot)) => {
                        let report = cache.restore(snapshot);
                        info!(
                            loaded = report.loaded,
                            expired = report.expired,
                            evicted = report.evicted,
                            "Restored cache from disk"
                        );
                    }
                    Ok(LoadOutcome::NotFound) => {
                        info!(path = ?path, "No cache snapshot found; starting empty");
                    }
                    Err(e) => {
                        warn!(path = ?path, error = %e, "Failed to load cache snapshot; starting empty");
                    }
                }

                let handle = PersistenceScheduler::new(Arc::clone(&cache), store, interval)?
                    .save_on_shutdown(cache_config.save_on_shutdown)
                    .start();
                Some(handle)
            }
            _ => None,
        };

        Ok(Self {
            settings,
            client,
            cache: Some(cache),
            scheduler,
        })
    }

    /// Looks up the directory record for `identifier_value`.
    ///
    /// Never fails: search errors become an `Error` outcome whose record
    /// is empty, or carries the message under `error` when error capture
    /// is enabled.
    #[instrument(skip(self))]
    pub async fn lookup(&self, identifier_value: &str) -> LookupOutcome {
        let Some(cache) = &self.cache else {
            let (record, status) = self.search(identifier_value).await;
            return LookupOutcome {
                record,
                status: Some(status),
                from_cache: false,
            };
        };

        let key = self.key_for(identifier_value);
        if let Some(record) = cache.get(&key) {
            debug!("Cache hit");
            return LookupOutcome {
                record,
                status: None,
                from_cache: true,
            };
        }

        debug!("Cache miss, searching directory");
        let (record, status) = self.search(identifier_value).await;

        if !status.is_failure() || self.settings.cache_failures {
            cache.put(key, record.clone());
        }

        LookupOutcome {
            record,
            status: Some(status),
            from_cache: false,
        }
    }

    async fn search(&self, identifier_value: &str) -> (ResultRecord, LookupStatus) {
        match self.client.search(identifier_value).await {
            Ok(SearchResult::Found(record)) => (record, LookupStatus::Ok),
            Ok(SearchResult::NotFound) => (ResultRecord::new(), LookupStatus::NotFound),
            Err(e) => {
                if e.is_recoverable() {
                    warn!(host = %self.settings.host, error = %e, "Directory search failed");
                } else {
                    error!(host = %self.settings.host, error = %e, "Directory search failed");
                }
                let record = if self.settings.enable_error_capture {
                    ResultRecord::error(e.to_string())
                } else {
                    ResultRecord::new()
                };
                (record, LookupStatus::Error)
            }
        }
    }

    /// Cache key for a lookup of `identifier_value` under these settings.
    pub fn key_for(&self, identifier_value: &str) -> CacheKey {
        LookupQuery::new(
            &self.settings.host,
            self.settings.port,
            &self.settings.identifier_key,
            identifier_value,
        )
        .fingerprint()
    }

    /// Returns the settings.
    pub fn settings(&self) -> &LookupSettings {
        &self.settings
    }

    /// Returns the cache, if caching is enabled.
    pub fn cache(&self) -> Option<&Arc<ResultCache>> {
        self.cache.as_ref()
    }

    /// Returns cache statistics, if caching is enabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// Returns persistence counters, if persistence is running.
    pub fn persistence_stats(&self) -> Option<SchedulerStats> {
        self.scheduler.as_ref().map(|s| s.stats())
    }

    /// Stops persistence, running the final save if configured.
    pub async fn shutdown(self) -> Option<SchedulerStats> {
        match self.scheduler {
            Some(handle) => Some(handle.shutdown().await),
            None => None,
        }
    }
}
