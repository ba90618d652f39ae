//! Shared entity cache.
//!
//! Entities are stored under hierarchical [`CacheKey`](mms_core::CacheKey)s
//! and handed out as [`EntryHandle`]s. Every reader of a key holds the same
//! handle, so an update made through one is visible to all of them.
//!
//! # Merge vs replace
//!
//! A merge put deep-merges into the existing entry and keeps its identity.
//! A replace put installs a new handle; earlier holders keep the old value.
//!
//! # Lists
//!
//! [`CacheStore::put_list`] stores a [`RefList`] whose items are the same
//! handles stored under each item's derived key.
//!
//! # Example
//!
//! ```ignore
//! let store = CacheStore::new();
//! let key = element_key("abc", "master", "latest", false);
//! let held = store.put(&key, json!({"sysmlid": "abc"}), true);
//! store.put(&key, json!({"name": "Renamed"}), true);
//! assert_eq!(held.snapshot()["name"], "Renamed");
//! ```

pub mod handle;
pub mod in_flight;
pub mod merge;
pub mod stats;
pub mod store;

pub use handle::{EntryHandle, RefList};
pub use in_flight::{InFlightRegistry, PendingRequest};
pub use merge::deep_merge;
pub use stats::CacheStats;
pub use store::{CacheSlot, CacheStore, DeriveFn, Derived};
