//! Cache key derivation for directory lookups.
//!
//! ```text
//! key = SHAKE256(DOMAIN_FINGERPRINT, [host, port_le, identifier_key, identifier_value])[..32]
//! ```
//!
//! All four fields are length-prefixed, so no two distinct queries can hash
//! the same input stream by shifting bytes between fields.

use dircache_core::constants::{CACHE_KEY_SIZE, DOMAIN_FINGERPRINT};
use dircache_core::types::CacheKey;

use crate::hash::shake256_multi;

/// Derives the cache key for a lookup query.
///
/// Pure and deterministic. Inputs are hashed verbatim: callers that want
/// case-insensitive hosts must normalize before calling.
pub fn fingerprint(host: &str, port: u16, identifier_key: &str, identifier_value: &str) -> CacheKey {
    let port = port.to_le_bytes();
    let bytes: [u8; CACHE_KEY_SIZE] = shake256_multi(
        DOMAIN_FINGERPRINT,
        &[
            host.as_bytes(),
            &port,
            identifier_key.as_bytes(),
            identifier_value.as_bytes(),
        ],
    );
    CacheKey::from_array(bytes)
}

/// The parameters of one directory lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LookupQuery<'a> {
    /// Directory server host
    pub host: &'a str,
    /// Directory server port
    pub port: u16,
    /// Identifier attribute name
    pub identifier_key: &'a str,
    /// Identifier value taken from the event
    pub identifier_value: &'a str,
}

impl<'a> LookupQuery<'a> {
    /// Creates a query.
    pub fn new(host: &'a str, port: u16, identifier_key: &'a str, identifier_value: &'a str) -> Self {
        Self {
            host,
            port,
            identifier_key,
            identifier_value,
        }
    }

    /// Cache key for this query.
    pub fn fingerprint(&self) -> CacheKey {
        fingerprint(self.host, self.port, self.identifier_key, self.identifier_value)
    }
}
