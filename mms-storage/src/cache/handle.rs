//! Shared entry handles.
//!
//! A cached value is owned by an [`EntryHandle`]: an `Arc` around a locked
//! JSON value plus a revision channel. Every holder of a clone of the handle
//! sees the same value, and every in-place mutation goes through
//! [`EntryHandle::update`], which bumps the revision and wakes subscribers.
//! Copies are only made when a caller explicitly asks for a snapshot.

use super::merge::deep_merge;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;

struct EntryInner {
    value: RwLock<Value>,
    revision: watch::Sender<u64>,
}

/// Stable, shared handle to one cached value.
#[derive(Clone)]
pub struct EntryHandle {
    inner: Arc<EntryInner>,
}

impl EntryHandle {
    pub fn new(value: Value) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(EntryInner {
                value: RwLock::new(value),
                revision,
            }),
        }
    }

    /// Clone of the current value.
    pub fn snapshot(&self) -> Value {
        self.read(Value::clone)
    }

    /// Run `f` against the current value without copying it.
    pub fn read<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        let guard = self.inner.value.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Mutate the value in place and notify subscribers.
    pub fn update<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let result = {
            let mut guard = self.inner.value.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        };
        self.inner.revision.send_modify(|rev| *rev += 1);
        result
    }

    /// Deep-merge `source` into the value in place.
    pub fn merge(&self, source: Value) {
        self.update(|target| deep_merge(target, source));
    }

    /// Number of updates applied since creation.
    pub fn revision(&self) -> u64 {
        *self.inner.revision.borrow()
    }

    /// Receiver that observes every update to this entry.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// True when both handles refer to the same stored entry.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for EntryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryHandle")
            .field("revision", &self.revision())
            .field("value", &self.snapshot())
            .finish()
    }
}

/// Shared, ordered list of entry handles.
///
/// List endpoints cache their result as references to the per-element
/// entries, so a list observes updates made to any of its elements.
#[derive(Clone, Default)]
pub struct RefList {
    items: Arc<RwLock<Vec<EntryHandle>>>,
}

impl RefList {
    pub fn new(items: Vec<EntryHandle>) -> Self {
        Self {
            items: Arc::new(RwLock::new(items)),
        }
    }

    pub fn handles(&self) -> Vec<EntryHandle> {
        self.items.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Snapshot of every element's current value.
    pub fn values(&self) -> Vec<Value> {
        self.handles().iter().map(EntryHandle::snapshot).collect()
    }

    pub fn push(&self, handle: EntryHandle) {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Swap the list contents in place. Every holder of the list sees them.
    pub fn set(&self, handles: Vec<EntryHandle>) {
        *self.items.write().unwrap_or_else(PoisonError::into_inner) = handles;
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }
}

impl fmt::Debug for RefList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefList").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clones_share_state() {
        let a = EntryHandle::new(json!({"name": "x"}));
        let b = a.clone();
        a.update(|v| v["name"] = json!("y"));
        assert_eq!(b.snapshot()["name"], "y");
        assert!(a.ptr_eq(&b));
        assert_eq!(b.revision(), 1);
    }

    #[test]
    fn test_distinct_handles_not_aliased() {
        let a = EntryHandle::new(json!({"n": 1}));
        let b = EntryHandle::new(a.snapshot());
        b.update(|v| v["n"] = json!(2));
        assert_eq!(a.snapshot()["n"], 1);
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn test_merge_in_place() {
        let a = EntryHandle::new(json!({"a": 1}));
        a.merge(json!({"b": 2}));
        assert_eq!(a.snapshot(), json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn test_subscribers_notified() {
        let a = EntryHandle::new(json!({}));
        let mut rx = a.subscribe();
        a.merge(json!({"k": true}));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
    }

    #[test]
    fn test_ref_list_observes_element_updates() {
        let item = EntryHandle::new(json!({"sysmlid": "v1", "name": "old"}));
        let list = RefList::new(vec![item.clone()]);
        item.merge(json!({"name": "new"}));
        assert_eq!(list.values()[0]["name"], "new");

        list.push(EntryHandle::new(json!({"sysmlid": "v2"})));
        assert_eq!(list.len(), 2);
        assert!(list.clone().ptr_eq(&list));

        let shared = list.clone();
        list.set(vec![item.clone()]);
        assert_eq!(shared.len(), 1);
        assert!(shared.handles()[0].ptr_eq(&item));
    }
}
