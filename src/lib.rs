//! Read-through, write-invalidated instance cache.
//!
//! Records are cached as JSON representations keyed by
//! `(version, type, primary key)`. Reads go through the cache and fall back
//! to registered loaders; writes re-serialize, compare, and cascade to
//! dependent instances.

pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
