//! mercato-middleware
//!
//! The two services that sit on every data request:
//!
//! - [`CacheService`]: TTL cache with optional persistence and
//!   stale-while-revalidate reads.
//! - [`ApiLimitManager`]: quota, rate and concurrency accounting per provider,
//!   weighted provider ranking and sequential failover.
//!
//! Both are plain structs meant to be shared behind an `Arc`; their periodic
//! maintenance is started explicitly with `spawn_cleanup` / `spawn_maintenance`.
#![warn(missing_docs)]

/// TTL cache service.
pub mod cache;
/// Provider limit management.
pub mod limits;

pub use cache::{CacheService, EntryInfo, cache_key};
pub use limits::{Admission, ApiLimitManager, DenyReason, SymbolPriorities};
