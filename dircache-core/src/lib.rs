//! # dircache core
//!
//! Shared building blocks for the dircache crates:
//!
//! - **Types**: cache keys, result records, entries, and snapshots
//! - **Errors**: error hierarchy for persistence, lookup, and configuration
//! - **Constants**: snapshot wire format and defaults
//! - **Config**: cache and lookup settings, schedule parsing
//! - **Traits**: the directory client collaborator interface
//!
//! ## Example
//!
//! ```rust
//! use dircache_core::{CacheConfig, ResultRecord};
//!
//! let config = CacheConfig::new(1000, 300);
//! config.validate().unwrap();
//!
//! let record = ResultRecord::new().with("sn", "BOURDIER");
//! assert_eq!(record.get("sn"), Some("BOURDIER"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod config;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use config::{parse_schedule, CacheConfig, LookupSettings};
pub use constants::*;
pub use error::{DecodeError, DirCacheError, Result};
pub use traits::*;
pub use types::*;
