//! # dircache lookup
//!
//! The boundary between an event pipeline and the directory service.
//!
//! For each event the host calls [`LookupOrchestrator::lookup`] with the
//! identifier value. The orchestrator fingerprints the query, serves it from
//! the cache when possible, and otherwise asks the host's
//! [`DirectoryClient`](dircache_core::DirectoryClient) and caches the answer.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dircache_lookup::LookupOrchestrator;
//!
//! let settings = LookupSettings::new("ldap.example.org").capture_errors();
//! let config = CacheConfig::from_env()?;
//! let orchestrator = LookupOrchestrator::start(settings, config, client).await?;
//!
//! let outcome = orchestrator.lookup("u501565").await;
//! if let Some(tag) = outcome.failure_tag() {
//!     event.add_tag(tag);
//! }
//!
//! orchestrator.shutdown().await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod orchestrator;

pub use orchestrator::{LookupOrchestrator, LookupOutcome, LookupStatus};
