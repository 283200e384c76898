//! Snapshot encoding.
//!
//! # Format
//!
//! ```text
//! magic     (4 bytes):  "DCSN"
//! version   (1 byte):   1
//! count     (8 bytes):  number of entries, u64 LE
//! length    (8 bytes):  payload length, u64 LE
//! checksum  (32 bytes): SHAKE256 of the payload
//! payload   (length):   bincode-serialized entries
//! ```
//!
//! The payload is self-delimiting (every string and sequence carries its
//! length), and the header pins its exact size and checksum. A truncated,
//! padded, or bit-flipped file is rejected instead of partially loaded.

use std::collections::HashSet;

use bincode::Options;

use dircache_core::constants::{CHECKSUM_SIZE, SNAPSHOT_HEADER_SIZE, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
use dircache_core::error::{DecodeError, DirCacheError, Result};
use dircache_core::types::{CacheEntry, Snapshot};
use dircache_crypto::snapshot_checksum;

const VERSION_OFFSET: usize = 4;
const COUNT_OFFSET: usize = 5;
const LENGTH_OFFSET: usize = 13;
const CHECKSUM_OFFSET: usize = 21;

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

/// Encodes a snapshot into its on-disk representation.
pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let payload = bincode::DefaultOptions::new()
        .serialize(snapshot.entries())
        .map_err(|e| DirCacheError::InternalError(format!("snapshot serialization failed: {}", e)))?;

    let mut out = Vec::with_capacity(SNAPSHOT_HEADER_SIZE + payload.len());
    out.extend_from_slice(SNAPSHOT_MAGIC);
    out.push(SNAPSHOT_VERSION);
    out.extend_from_slice(&(snapshot.len() as u64).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&snapshot_checksum(&payload));
    out.extend_from_slice(&payload);

    debug_assert_eq!(out.len(), SNAPSHOT_HEADER_SIZE + payload.len());
    Ok(out)
}

/// Decodes a snapshot, rejecting anything truncated, corrupt, or ambiguous.
pub fn decode(bytes: &[u8]) -> std::result::Result<Snapshot, DecodeError> {
    let magic_len = bytes.len().min(SNAPSHOT_MAGIC.len());
    if bytes[..magic_len] != SNAPSHOT_MAGIC[..magic_len] {
        return Err(DecodeError::InvalidMagic);
    }
    if bytes.len() < SNAPSHOT_HEADER_SIZE {
        return Err(DecodeError::Truncated {
            expected: SNAPSHOT_HEADER_SIZE,
            actual: bytes.len(),
        });
    }

    let version = bytes[VERSION_OFFSET];
    if version != SNAPSHOT_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            expected: SNAPSHOT_VERSION,
            actual: version,
        });
    }

    let count = read_u64(bytes, COUNT_OFFSET);
    let length = usize::try_from(read_u64(bytes, LENGTH_OFFSET))
        .map_err(|_| DecodeError::Malformed("payload length exceeds address space".into()))?;
    let expected = SNAPSHOT_HEADER_SIZE
        .checked_add(length)
        .ok_or_else(|| DecodeError::Malformed("payload length overflows".into()))?;

    if bytes.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    if bytes.len() > expected {
        return Err(DecodeError::TrailingBytes(bytes.len() - expected));
    }

    let checksum = &bytes[CHECKSUM_OFFSET..CHECKSUM_OFFSET + CHECKSUM_SIZE];
    let payload = &bytes[SNAPSHOT_HEADER_SIZE..];
    if snapshot_checksum(payload) != checksum {
        return Err(DecodeError::ChecksumMismatch);
    }

    let entries: Vec<CacheEntry> = bincode::DefaultOptions::new()
        .with_limit(payload.len() as u64)
        .reject_trailing_bytes()
        .deserialize(payload)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    if entries.len() as u64 != count {
        return Err(DecodeError::CountMismatch {
            expected: count,
            actual: entries.len() as u64,
        });
    }

    let mut seen = HashSet::with_capacity(entries.len());
    for entry in &entries {
        if !seen.insert(entry.key) {
            return Err(DecodeError::DuplicateKey(entry.key.to_hex()));
        }
    }

    Ok(Snapshot::from_entries(entries))
}
