//! Bounded TTL cache for directory lookup results.
//!
//! Size-bounded, time-expiring, thread-safe. Evicts by insertion age and
//! expires lazily on access.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod cache;
mod clock;

pub use cache::{CacheStats, RestoreReport, ResultCache};
pub use clock::{Clock, ManualClock, SystemClock};
