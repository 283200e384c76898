//! Hashing utilities with domain separation.
//!
//! Every SHAKE256 call is prefixed with a length-prefixed domain separator:
//!
//! ```text
//! output = SHAKE256(len(domain) || domain || len(input_1) || input_1 || ..., N)
//! ```
//!
//! so fingerprints and checksums computed over the same bytes never collide.

use sha3::{
    digest::{ExtendableOutput, Update, XofReader},
    Shake256,
};

use dircache_core::constants::{CHECKSUM_SIZE, DOMAIN_SNAPSHOT_CHECKSUM};

fn domain_hasher(domain: &[u8]) -> Shake256 {
    let mut hasher = Shake256::default();
    hasher.update(&(domain.len() as u32).to_le_bytes());
    hasher.update(domain);
    hasher
}

/// Computes SHAKE256 over several inputs into a fixed-size array.
///
/// Each input is prefixed with its length (u64 LE), so the boundary between
/// parts is part of the hash: `["ab", "c"]` and `["a", "bc"]` differ.
pub fn shake256_multi<const N: usize>(domain: &[u8], inputs: &[&[u8]]) -> [u8; N] {
    let mut hasher = domain_hasher(domain);

    for input in inputs {
        hasher.update(&(input.len() as u64).to_le_bytes());
        hasher.update(input);
    }

    let mut reader = hasher.finalize_xof();
    let mut output = [0u8; N];
    reader.read(&mut output);
    output
}

/// Checksum stored in the snapshot header to detect corrupted payloads.
pub fn snapshot_checksum(payload: &[u8]) -> [u8; CHECKSUM_SIZE] {
    shake256_multi(DOMAIN_SNAPSHOT_CHECKSUM, &[payload])
}
