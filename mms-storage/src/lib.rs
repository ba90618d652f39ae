//! MMS Storage - Entity Cache and Request Deduplication
//!
//! Process-wide keyed store for fetched entities plus the registry that
//! collapses concurrent identical requests into one backend call.

pub mod cache;

pub use cache::{
    deep_merge, CacheSlot, CacheStats, CacheStore, DeriveFn, Derived, EntryHandle,
    InFlightRegistry, PendingRequest, RefList,
};
