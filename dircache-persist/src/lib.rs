//! # dircache persist
//!
//! Durable snapshots for the lookup result cache.
//!
//! - **Codec**: versioned, checksummed binary snapshot format
//! - **Store**: single-file store with atomic temp-file-and-rename saves
//! - **Scheduler**: background task that saves on a fixed interval
//!
//! ## Example
//!
//! ```rust,ignore
//! use dircache_persist::{FileStore, LoadOutcome, PersistenceScheduler};
//!
//! let store = Arc::new(FileStore::new("/var/lib/dircache/cache.bin"));
//! if let LoadOutcome::Loaded(snapshot) = store.load().await? {
//!     cache.restore(snapshot);
//! }
//!
//! let handle = PersistenceScheduler::new(cache, store, interval)?.start();
//! // ...
//! handle.shutdown().await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod codec;
mod scheduler;
mod store;

pub use codec::{decode, encode};
pub use scheduler::{PersistenceScheduler, SchedulerHandle, SchedulerState, SchedulerStats};
pub use store::{FileStore, LoadOutcome, SaveReport};
