//! Constants shared across dircache crates.
//!
//! Wire-format values here are part of the on-disk snapshot format. Changing
//! any of them makes previously written snapshot files unreadable.

// ═══════════════════════════════════════════════════════════════════════════════
// CACHE KEY
// ═══════════════════════════════════════════════════════════════════════════════

/// Size of a cache key (SHAKE256 fingerprint output) in bytes.
pub const CACHE_KEY_SIZE: usize = 32;

/// Size of the snapshot payload checksum in bytes.
pub const CHECKSUM_SIZE: usize = 32;

// ═══════════════════════════════════════════════════════════════════════════════
// DOMAIN SEPARATORS
// ═══════════════════════════════════════════════════════════════════════════════
// Each SHAKE256 invocation uses a unique domain separator so fingerprints and
// checksums can never collide, even over identical input bytes.

/// Domain separator for lookup fingerprints.
pub const DOMAIN_FINGERPRINT: &[u8] = b"DIRCACHE_FINGERPRINT_V1";

/// Domain separator for snapshot payload checksums.
pub const DOMAIN_SNAPSHOT_CHECKSUM: &[u8] = b"DIRCACHE_SNAPSHOT_V1";

// ═══════════════════════════════════════════════════════════════════════════════
// SNAPSHOT FILE FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// Magic bytes at the start of every snapshot file.
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"DCSN";

/// Current snapshot format version.
/// Increment when the payload layout changes.
pub const SNAPSHOT_VERSION: u8 = 1;

/// Size of the fixed snapshot header.
/// magic (4) + version (1) + count (8) + payload length (8) + checksum (32) = 53 bytes
pub const SNAPSHOT_HEADER_SIZE: usize = 4 + 1 + 8 + 8 + CHECKSUM_SIZE;

/// Extension used for the temporary file written before the atomic rename.
pub const SNAPSHOT_TEMP_EXTENSION: &str = "tmp";

// ═══════════════════════════════════════════════════════════════════════════════
// CACHE DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default maximum number of cached lookup results.
pub const DEFAULT_MAX_ENTRIES: usize = 20_000;

/// Default time-to-live of a cached lookup result, in seconds.
pub const DEFAULT_TTL_SECONDS: u64 = 300;

/// Default persistence schedule (every ten minutes).
pub const DEFAULT_PERSIST_SCHEDULE: &str = "10m";

/// Longest accepted persistence interval (one year).
pub const MAX_PERSIST_INTERVAL_SECS: u64 = 365 * 86_400;

// ═══════════════════════════════════════════════════════════════════════════════
// DIRECTORY LOOKUP DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default plain LDAP port.
pub const DEFAULT_LDAP_PORT: u16 = 389;

/// Default attribute used to identify a directory object.
pub const DEFAULT_IDENTIFIER_KEY: &str = "uid";

/// Attribute name carrying the error message when error capture is enabled.
pub const ERROR_ATTRIBUTE: &str = "error";

/// Status tag for a successful lookup.
pub const STATUS_TAG_OK: &str = "LDAP_OK";

/// Status tag for a lookup that failed with an error.
pub const STATUS_TAG_ERROR: &str = "LDAP_ERROR";

/// Status tag for a lookup that found no matching object.
pub const STATUS_TAG_NOT_FOUND: &str = "LDAP_NOT_FOUND";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(SNAPSHOT_HEADER_SIZE, 53);
    }

    #[test]
    fn test_domain_separators_unique() {
        assert_ne!(DOMAIN_FINGERPRINT, DOMAIN_SNAPSHOT_CHECKSUM);
    }

    #[test]
    fn test_status_tags_unique() {
        let tags = [STATUS_TAG_OK, STATUS_TAG_ERROR, STATUS_TAG_NOT_FOUND];
        for (i, a) in tags.iter().enumerate() {
            for (j, b) in tags.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Status tags must be unique");
                }
            }
        }
    }
}
