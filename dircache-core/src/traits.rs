//! Interfaces implemented outside the caching core.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ResultRecord;

// ═══════════════════════════════════════════════════════════════════════════════
// DIRECTORY CLIENT TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of a directory search that completed without error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchResult {
    /// A matching object was found; carries its selected attributes.
    Found(ResultRecord),
    /// No object matched the identifier.
    NotFound,
}

/// Directory service client used on a cache miss.
///
/// Implementations own connection handling, binding, filter construction
/// and attribute selection. The cache only stores what they return.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Searches for the object whose identifier attribute equals
    /// `identifier_value`.
    async fn search(&self, identifier_value: &str) -> Result<SearchResult>;
}
