//! Cache module fronting the network calls
//!
//! This module provides a two-tier (memory + disk) cache keyed by caller-built
//! strings. Freshness is checked against a caller-supplied TTL at read time;
//! expired entries are simply ignored until the next write replaces them.

mod manager;

pub use manager::CacheManager;
