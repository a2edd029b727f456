//! Per-file analysis cache: storage and the reuse/recompute decision.

pub mod store;
pub mod strategy;

pub use store::{CacheAnalysis, CacheEntry, CacheKey, CacheStore, FsCacheStore};
pub use strategy::{format_marker, AnalysisCache, CacheStrategy};
