//! Cache key type.

use serde::{Deserialize, Serialize};

use crate::constants::CACHE_KEY_SIZE;
use crate::error::{DirCacheError, Result};

/// Opaque fingerprint identifying a distinct lookup query.
///
/// Produced by hashing the lookup parameters; never reversed back to them.
/// Ordering is plain byte order and is used to break eviction ties.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    bytes: [u8; CACHE_KEY_SIZE],
}

impl CacheKey {
    /// Creates a key from raw bytes.
    ///
    /// # Errors
    /// Returns error if bytes length doesn't match `CACHE_KEY_SIZE`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CACHE_KEY_SIZE {
            return Err(DirCacheError::ValidationError(format!(
                "cache key must be {} bytes, got {}",
                CACHE_KEY_SIZE,
                bytes.len()
            )));
        }

        let mut arr = [0u8; CACHE_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Creates a key from a fixed-size array.
    pub const fn from_array(bytes: [u8; CACHE_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the hex-encoded key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Creates a key from a hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CacheKey({}...)", hex::encode(&self.bytes[..8]))
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; CACHE_KEY_SIZE]> for CacheKey {
    fn from(bytes: [u8; CACHE_KEY_SIZE]) -> Self {
        Self::from_array(bytes)
    }
}

// Serde implementation that uses hex encoding
impl Serialize for CacheKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CacheKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
