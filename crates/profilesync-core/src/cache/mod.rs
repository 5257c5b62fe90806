//! In-memory profile cache.
//!
//! This module provides `ProfileCache`, which holds at most one profile
//! plus the time it was last refreshed. Data is considered stale after
//! 5 minutes by default; staleness never removes the entry.

pub mod store;

pub use store::{default_ttl, CacheEntry, ProfileCache, DEFAULT_TTL_MINUTES};
