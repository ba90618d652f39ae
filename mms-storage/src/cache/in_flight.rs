//! Deduplication of concurrent identical requests.
//!
//! The first caller for a request signature registers a shared future;
//! later callers with the same signature await that same future instead of
//! issuing a second network call. The entry is removed when the future
//! completes, successfully or not, before any waiter observes the result.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use mms_core::MmsResult;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Pending request that any number of callers can await.
pub type PendingRequest<T> = Shared<BoxFuture<'static, MmsResult<T>>>;

type PendingMap<T> = Arc<Mutex<HashMap<String, PendingRequest<T>>>>;

/// Registry of in-flight requests keyed by request signature.
pub struct InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pending: PendingMap<T>,
}

impl<T> Default for InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// The pending request for `key`, if one is registered.
    pub fn join(&self, key: &str) -> Option<PendingRequest<T>> {
        let joined = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        if joined.is_some() {
            debug!(key, "joining in-flight request");
        }
        joined
    }

    /// Join the pending request for `key`, or start one with `start`.
    ///
    /// `start` is only invoked when nothing is registered under `key`.
    pub fn register_or_join<F, Fut>(&self, key: &str, start: F) -> PendingRequest<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MmsResult<T>> + Send + 'static,
    {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = pending.get(key) {
            debug!(key, "joining in-flight request");
            return existing.clone();
        }

        let registry = Arc::clone(&self.pending);
        let owned_key = key.to_string();
        let request = start();
        let shared = async move {
            let result = request.await;
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&owned_key);
            result
        }
        .boxed()
        .shared();

        pending.insert(key.to_string(), shared.clone());
        shared
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> std::fmt::Debug for InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightRegistry")
            .field("pending", &self.len())
            .finish()
    }
}
