//! # dircache crypto
//!
//! Hashing for the dircache subsystem:
//!
//! - **Hash**: SHAKE256 with domain separation and length-prefixed inputs
//! - **Fingerprint**: stable cache keys for directory lookup queries
//!
//! ## Example
//!
//! ```rust
//! use dircache_crypto::fingerprint;
//!
//! let a = fingerprint("ldap.example.org", 389, "uid", "u501565");
//! let b = fingerprint("ldap.example.org", 389, "uid", "u501565");
//! assert_eq!(a, b);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod fingerprint;
pub mod hash;

// Re-export main functions at crate root
pub use fingerprint::{fingerprint, LookupQuery};
pub use hash::{shake256_multi, snapshot_checksum};
