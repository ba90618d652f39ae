//! Keyed cache store with merge-or-replace puts and cascading derived puts.

use super::handle::{EntryHandle, RefList};
use super::stats::{CacheStats, StatCounters};
use mms_core::CacheKey;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Produces a secondary put for one element of a list value.
///
/// Called with the element and its index. Returning `None` leaves the element
/// without a keyed entry of its own.
pub type DeriveFn = Arc<dyn Fn(&Value, usize) -> Option<Derived> + Send + Sync>;

/// Secondary put produced by a [`DeriveFn`].
#[derive(Clone)]
pub struct Derived {
    pub key: CacheKey,
    pub value: Value,
    pub merge: bool,
    pub derive: Option<DeriveFn>,
}

impl Derived {
    /// Merge `value` into whatever is stored at `key`.
    pub fn merge(key: CacheKey, value: Value) -> Self {
        Self {
            key,
            value,
            merge: true,
            derive: None,
        }
    }

    /// Store `value` at `key` as a new reference.
    pub fn replace(key: CacheKey, value: Value) -> Self {
        Self {
            key,
            value,
            merge: false,
            derive: None,
        }
    }

    /// Cascade further from this put when `value` is itself a list.
    pub fn with_derive(mut self, derive: DeriveFn) -> Self {
        self.derive = Some(derive);
        self
    }
}

/// What a key holds.
#[derive(Debug, Clone)]
pub enum CacheSlot {
    Entry(EntryHandle),
    Refs(RefList),
}

/// Keyed storage for cached entities.
///
/// One store is owned per session; services share it through an `Arc`.
/// Lookups hand out [`EntryHandle`]s, never copies.
#[derive(Debug, Default)]
pub struct CacheStore {
    slots: RwLock<HashMap<String, CacheSlot>>,
    counters: StatCounters,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &CacheKey) -> Option<CacheSlot> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.joined())
            .cloned()
    }

    /// The entry stored at `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<EntryHandle> {
        match self.slot(key) {
            Some(CacheSlot::Entry(handle)) => {
                StatCounters::bump(&self.counters.hits);
                Some(handle)
            }
            _ => {
                StatCounters::bump(&self.counters.misses);
                None
            }
        }
    }

    /// The reference list stored at `key`, if any.
    pub fn get_refs(&self, key: &CacheKey) -> Option<RefList> {
        match self.slot(key) {
            Some(CacheSlot::Refs(list)) => {
                StatCounters::bump(&self.counters.hits);
                Some(list)
            }
            _ => {
                StatCounters::bump(&self.counters.misses);
                None
            }
        }
    }

    pub fn exists(&self, key: &CacheKey) -> bool {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key.joined())
    }

    /// Store `value` at `key`.
    ///
    /// With `merge` set and an entry already present, `value` is deep-merged
    /// into that entry and the existing handle is returned. Otherwise a new
    /// handle replaces whatever was stored.
    pub fn put(&self, key: &CacheKey, value: Value, merge: bool) -> EntryHandle {
        let existing = if merge { self.entry_for_merge(key) } else { None };
        match existing {
            Some(handle) => {
                handle.merge(value);
                StatCounters::bump(&self.counters.merges);
                handle
            }
            None => {
                let handle = EntryHandle::new(value);
                self.slots
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key.joined(), CacheSlot::Entry(handle.clone()));
                StatCounters::bump(&self.counters.replacements);
                handle
            }
        }
    }

    /// Store a list at `key`, seeding per-item entries through `derive`.
    ///
    /// Each item for which `derive` yields a [`Derived`] put is stored under
    /// the derived key, and the list holds the handle of that entry, so the
    /// list observes later updates to the item. Items without a derived key
    /// are held by value. A derived put that carries its own `derive` and an
    /// array value cascades into a nested list at the derived key.
    ///
    /// With `merge` set and a list already present, that list's contents are
    /// swapped in place and the existing [`RefList`] is returned.
    pub fn put_list(
        &self,
        key: &CacheKey,
        items: Vec<Value>,
        merge: bool,
        derive: Option<&DeriveFn>,
    ) -> RefList {
        let handles: Vec<EntryHandle> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| self.put_item(item, index, derive))
            .collect();

        let existing = if merge { self.refs_for_merge(key) } else { None };
        match existing {
            Some(list) => {
                list.set(handles);
                StatCounters::bump(&self.counters.merges);
                list
            }
            None => self.put_refs(key, handles),
        }
    }

    fn put_item(&self, item: Value, index: usize, derive: Option<&DeriveFn>) -> EntryHandle {
        let Some(derived) = derive.and_then(|derive| derive(&item, index)) else {
            return EntryHandle::new(item);
        };
        match (derived.derive.as_ref(), derived.value) {
            (Some(nested), Value::Array(children)) => {
                self.put_list(&derived.key, children, derived.merge, Some(nested));
                EntryHandle::new(item)
            }
            (_, value) => self.put(&derived.key, value, derived.merge),
        }
    }

    fn refs_for_merge(&self, key: &CacheKey) -> Option<RefList> {
        match self.slot(key) {
            Some(CacheSlot::Refs(list)) => Some(list),
            _ => None,
        }
    }

    fn entry_for_merge(&self, key: &CacheKey) -> Option<EntryHandle> {
        match self.slot(key) {
            Some(CacheSlot::Entry(handle)) => Some(handle),
            _ => None,
        }
    }

    /// Store a list of references at `key`, replacing whatever was there.
    pub fn put_refs(&self, key: &CacheKey, handles: Vec<EntryHandle>) -> RefList {
        let list = RefList::new(handles);
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.joined(), CacheSlot::Refs(list.clone()));
        StatCounters::bump(&self.counters.replacements);
        list
    }

    /// Remove and return whatever is stored at `key`.
    pub fn remove(&self, key: &CacheKey) -> Option<CacheSlot> {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key.joined())
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Outstanding handles keep their last value.
    pub fn clear(&self) {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len() as u64)
    }
}
