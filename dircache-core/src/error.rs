//! Error types for dircache.
//!
//! The cache itself has no runtime error conditions. Everything here comes
//! from configuration, persistence, or the external directory collaborator.
//! Persistence failures are reported but never fatal to the request path.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using `DirCacheError`.
pub type Result<T> = std::result::Result<T, DirCacheError>;

/// Reasons a snapshot byte stream cannot be decoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes than the header or the declared payload length requires.
    #[error("Snapshot truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// More bytes than the declared payload length.
    #[error("Snapshot has {0} trailing bytes")]
    TrailingBytes(usize),

    /// File does not start with the snapshot magic.
    #[error("Invalid snapshot magic bytes")]
    InvalidMagic,

    /// Snapshot was written by an unknown format version.
    #[error("Unsupported snapshot version: expected {expected}, got {actual}")]
    UnsupportedVersion { expected: u8, actual: u8 },

    /// Payload checksum does not match the header.
    #[error("Snapshot checksum mismatch")]
    ChecksumMismatch,

    /// Header entry count disagrees with the decoded payload.
    #[error("Snapshot entry count mismatch: header says {expected}, payload has {actual}")]
    CountMismatch { expected: u64, actual: u64 },

    /// The same key appears twice.
    #[error("Duplicate key in snapshot: {0}")]
    DuplicateKey(String),

    /// Payload is structurally invalid (bad length field, non-UTF-8 text, bad key).
    #[error("Malformed snapshot payload: {0}")]
    Malformed(String),
}

/// Main error type for all dircache operations.
#[derive(Debug, Error)]
pub enum DirCacheError {
    // ═══════════════════════════════════════════════════════════════════════════
    // PERSISTENCE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Snapshot bytes are corrupt or truncated.
    #[error("Snapshot decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Snapshot file exists but could not be read.
    #[error("Failed to load snapshot from {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot could not be written or renamed into place.
    #[error("Failed to save snapshot to {path:?}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // DIRECTORY LOOKUP ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The directory search itself failed.
    #[error("Directory lookup failed: {0}")]
    LookupFailed(String),

    /// The directory server did not answer in time.
    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Invalid hex encoding.
    #[error("Invalid hex encoding: {0}")]
    HexError(#[from] hex::FromHexError),

    // ═══════════════════════════════════════════════════════════════════════════
    // STORAGE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// File I/O error outside of snapshot load/save.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    // ═══════════════════════════════════════════════════════════════════════════
    // VALIDATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Input validation failed.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Internal invariant violation (should never happen).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DirCacheError {
    /// Returns true if this error is recoverable (can retry).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DirCacheError::LookupFailed(_)
                | DirCacheError::ConnectionTimeout(_)
                | DirCacheError::Save { .. }
        )
    }

    /// Returns true if this error came from snapshot load, save, or decode.
    pub fn is_persistence_error(&self) -> bool {
        matches!(
            self,
            DirCacheError::Decode(_) | DirCacheError::Load { .. } | DirCacheError::Save { .. }
        )
    }

    /// Returns true if this is a validation or configuration error.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            DirCacheError::ValidationError(_) | DirCacheError::ConfigError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DirCacheError::from(DecodeError::Truncated {
            expected: 53,
            actual: 12,
        });
        assert!(err.to_string().contains("53"));
        assert!(err.to_string().contains("12"));
    }

    #[test]
    fn test_error_classification() {
        assert!(DirCacheError::LookupFailed("test".into()).is_recoverable());
        assert!(DirCacheError::ConnectionTimeout("test".into()).is_recoverable());
        assert!(!DirCacheError::ConfigError("test".into()).is_recoverable());

        let save = DirCacheError::Save {
            path: PathBuf::from("/tmp/cache"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(save.is_persistence_error());
        assert!(save.is_recoverable());
        assert!(DirCacheError::from(DecodeError::InvalidMagic).is_persistence_error());
        assert!(!DirCacheError::LookupFailed("test".into()).is_persistence_error());

        assert!(DirCacheError::ConfigError("test".into()).is_validation_error());
    }

    #[test]
    fn test_load_error_keeps_source() {
        use std::error::Error as _;

        let err = DirCacheError::Load {
            path: PathBuf::from("/var/lib/cache"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("/var/lib/cache"));
    }
}
