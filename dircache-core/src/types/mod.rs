//! Domain types for dircache.
//!
//! - [`CacheKey`]: fixed-size fingerprint of a lookup query
//! - [`ResultRecord`]: attribute map produced by a directory lookup
//! - [`CacheEntry`]: a record plus its creation time
//! - [`Snapshot`]: point-in-time copy of the live cache entries

mod key;
mod record;
mod snapshot;

pub use key::*;
pub use record::*;
pub use snapshot::*;
