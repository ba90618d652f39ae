//! Element access: cached reads, edit copies, writes with conflict recovery.
//!
//! Reads go through three checks in order: a matching in-flight request is
//! joined, then a cached entry is returned unless forced or partially
//! hydrated, and only then is the backend called. Writes merge the server
//! response into the canonical entry in place and reconcile any edit copy.

use crate::conflict::{ConflictResolver, Resolution};
use crate::context::{for_fetch, for_workspace, ServiceContext};
use futures_util::future::try_join_all;
use mms_core::{
    clean_element, element_id, element_key, envelope_first, envelope_list, has_field,
    is_partially_hydrated, normalize, CacheKey, MmsError, MmsResult, Normalized, RequestOptions,
    Transport, ValidationError, ID_FIELD, LATEST, OWNER_FIELD, READ_FIELD, SPECIALIZATION_FIELD,
    VIEW2VIEW_FIELD,
};
use mms_storage::{deep_merge, CacheStore, EntryHandle, InFlightRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entity name used in element validation errors.
pub const ELEMENT_ENTITY: &str = "Element";

/// Version segment under which an element's version history is cached.
pub const VERSIONS_SEGMENT: &str = "versions";

fn view2view_of(element: &Value) -> Option<&Value> {
    element.get(SPECIALIZATION_FIELD)?.get(VIEW2VIEW_FIELD)
}

async fn fetch_element(
    transport: Arc<dyn Transport>,
    store: Arc<CacheStore>,
    url: String,
    key: CacheKey,
) -> MmsResult<EntryHandle> {
    let data = transport.get(&url).await?;
    let mut element = envelope_first(&data, "elements")?;
    clean_element(&mut element, false);
    Ok(store.put(&key, element, true))
}

async fn fetch_element_list(
    transport: Arc<dyn Transport>,
    store: Arc<CacheStore>,
    url: String,
    kind: String,
    n: Normalized,
) -> MmsResult<Vec<EntryHandle>> {
    let data = transport.get(&url).await?;
    let items = envelope_list(&data, &kind)?;
    debug!(%url, count = items.len(), "caching element list");
    let ids = items
        .iter()
        .map(|element| {
            element_id(element)
                .map(str::to_string)
                .ok_or_else(|| MmsError::malformed(format!("'{kind}' entry without {ID_FIELD}")))
        })
        .collect::<MmsResult<Vec<_>>>()?;
    let handles = items
        .into_iter()
        .zip(ids)
        .map(|(mut element, id)| {
            clean_element(&mut element, false);
            let key = element_key(&id, &n.workspace, &n.version, false);
            store.put(&key, element, true)
        })
        .collect();
    Ok(handles)
}

/// Element reads and writes over the shared cache.
#[derive(Clone)]
pub struct ElementService {
    ctx: ServiceContext,
    element_requests: Arc<InFlightRegistry<EntryHandle>>,
    list_requests: Arc<InFlightRegistry<Vec<EntryHandle>>>,
    conflicts: ConflictResolver,
    holding_bin_owner: Arc<str>,
}

impl ElementService {
    pub fn new(ctx: ServiceContext, holding_bin_owner: impl Into<String>) -> Self {
        let owner: String = holding_bin_owner.into();
        Self {
            ctx,
            element_requests: Arc::new(InFlightRegistry::new()),
            list_requests: Arc::new(InFlightRegistry::new()),
            conflicts: ConflictResolver::new(),
            holding_bin_owner: Arc::from(owner),
        }
    }

    /// Fetch one element, serving it from cache when possible.
    ///
    /// Concurrent calls with the same id, force flag, workspace and version
    /// share one backend request.
    pub async fn get_element(&self, id: &str, options: &RequestOptions) -> MmsResult<EntryHandle> {
        let n = normalize(options);
        let key = element_key(id, &n.workspace, &n.version, false);
        let signature = format!(
            "getElement({id}|{}|{}|{})",
            n.force_update, n.workspace, n.version
        );

        if let Some(pending) = self.element_requests.join(&signature) {
            return pending.await;
        }

        if !n.force_update {
            if let Some(cached) = self.ctx.store.get(&key) {
                if !cached.read(is_partially_hydrated) {
                    debug!(%key, "cache hit");
                    return Ok(cached);
                }
                debug!(%key, "cached container lacks contains, refreshing");
            }
        }

        debug!(%key, "fetching element");
        let url = self.ctx.urls.element(id, &n.workspace, &n.version);
        let transport = Arc::clone(&self.ctx.transport);
        let store = Arc::clone(&self.ctx.store);
        self.element_requests
            .register_or_join(&signature, move || fetch_element(transport, store, url, key))
            .await
    }

    /// Fetch several elements. Order follows `ids`; any failure fails the call.
    pub async fn get_elements<S: AsRef<str>>(
        &self,
        ids: &[S],
        options: &RequestOptions,
    ) -> MmsResult<Vec<EntryHandle>> {
        try_join_all(ids.iter().map(|id| self.get_element(id.as_ref(), options))).await
    }

    /// The edit copy of an element, created from the canonical entry on first request.
    pub async fn get_element_for_edit(
        &self,
        id: &str,
        force: bool,
        workspace: Option<&str>,
    ) -> MmsResult<EntryHandle> {
        let n = for_fetch(force, workspace);
        let edit_key = element_key(id, &n.workspace, LATEST, true);

        if !n.force_update {
            if let Some(edit) = self.ctx.store.get(&edit_key) {
                debug!(key = %edit_key, "edit copy hit");
                return Ok(edit);
            }
        }

        let options = RequestOptions::new()
            .force(n.force_update)
            .workspace(n.workspace.clone());
        let canonical = self.get_element(id, &options).await?;
        let mut copy = canonical.snapshot();
        clean_element(&mut copy, true);
        Ok(self.ctx.store.put(&edit_key, copy, true))
    }

    pub async fn get_elements_for_edit<S: AsRef<str>>(
        &self,
        ids: &[S],
        force: bool,
        workspace: Option<&str>,
    ) -> MmsResult<Vec<EntryHandle>> {
        try_join_all(
            ids.iter()
                .map(|id| self.get_element_for_edit(id.as_ref(), force, workspace)),
        )
        .await
    }

    /// Every element owned by `id`, recursively.
    pub async fn get_owned_elements(
        &self,
        id: &str,
        options: &RequestOptions,
    ) -> MmsResult<Vec<EntryHandle>> {
        let n = normalize(options);
        let url = self.ctx.urls.owned_elements(id, &n.workspace);
        self.get_generic_elements(&url, "elements", options).await
    }

    /// Fetch any element list endpoint and cache each element under its own key.
    ///
    /// `kind` names the envelope array holding the elements. List results
    /// are always fetched; the individual entries are merged into the cache.
    pub async fn get_generic_elements(
        &self,
        url: &str,
        kind: &str,
        options: &RequestOptions,
    ) -> MmsResult<Vec<EntryHandle>> {
        let n = normalize(options);
        let signature = format!(
            "getGenericElements({url}|{kind}|{}|{}|{})",
            n.force_update, n.workspace, n.version
        );

        let transport = Arc::clone(&self.ctx.transport);
        let store = Arc::clone(&self.ctx.store);
        let (url, kind) = (url.to_string(), kind.to_string());
        self.list_requests
            .register_or_join(&signature, move || {
                fetch_element_list(transport, store, url, kind, n)
            })
            .await
    }

    /// Keyword search over elements.
    pub async fn search(
        &self,
        query: &str,
        force: bool,
        workspace: Option<&str>,
    ) -> MmsResult<Vec<EntryHandle>> {
        let n = for_fetch(force, workspace);
        let url = self.ctx.urls.element_search(query);
        let options = RequestOptions::new()
            .force(n.force_update)
            .workspace(n.workspace);
        self.get_generic_elements(&url, "elements", &options).await
    }

    /// Version history of an element, cached under the `versions` segment.
    pub async fn get_element_versions(
        &self,
        id: &str,
        force: bool,
        workspace: Option<&str>,
    ) -> MmsResult<EntryHandle> {
        let n = for_fetch(force, workspace);
        let key = element_key(id, &n.workspace, VERSIONS_SEGMENT, false);
        if !n.force_update {
            if let Some(cached) = self.ctx.store.get(&key) {
                return Ok(cached);
            }
        }

        let data = self
            .ctx
            .transport
            .get(&self.ctx.urls.element_versions(id))
            .await?;
        let versions = data
            .get(VERSIONS_SEGMENT)
            .cloned()
            .ok_or_else(|| MmsError::malformed("response has no 'versions' entry"))?;
        Ok(self.ctx.store.put(&key, versions, true))
    }

    /// Save an element.
    ///
    /// The element must carry its id. `owner` is never sent. A conflict
    /// whose server copy differs from the cached baseline only in volatile
    /// fields is retried once with the server's read stamp; any other
    /// conflict is returned to the caller with the cache untouched.
    pub async fn update_element(
        &self,
        element: Value,
        workspace: Option<&str>,
    ) -> MmsResult<EntryHandle> {
        let id = element_id(&element)
            .map(str::to_string)
            .ok_or_else(|| ValidationError::MissingIdentity {
                entity: ELEMENT_ENTITY.to_string(),
            })?;
        let n = for_workspace(workspace);

        let mut element = element;
        if let Some(obj) = element.as_object_mut() {
            obj.remove(OWNER_FIELD);
        }

        match self.post_update(&id, &element, &n.workspace).await {
            Err(MmsError::Conflict(failure)) => {
                let baseline = self
                    .ctx
                    .store
                    .get(&element_key(&id, &n.workspace, LATEST, false))
                    .map(|handle| handle.snapshot());
                match self.conflicts.resolve(&failure, baseline.as_ref()) {
                    Resolution::Retry { read } => {
                        info!(%id, "read stamp raced, retrying update once");
                        if let Some(obj) = element.as_object_mut() {
                            obj.insert(READ_FIELD.to_string(), read);
                        }
                        self.post_update(&id, &element, &n.workspace).await
                    }
                    Resolution::Propagate => {
                        warn!(%id, "update conflicts with the server copy");
                        Err(MmsError::Conflict(failure))
                    }
                }
            }
            other => other,
        }
    }

    async fn post_update(&self, id: &str, element: &Value, workspace: &str) -> MmsResult<EntryHandle> {
        let url = self.ctx.urls.post_elements(workspace);
        let body = json!({ "elements": [element] });
        let data = self.ctx.transport.post(&url, Some(&body)).await?;
        let mut response = envelope_first(&data, "elements")?;
        clean_element(&mut response, false);

        let key = element_key(id, workspace, LATEST, false);
        let handle = self.ctx.store.put(&key, response, true);

        if let Some(sent) = view2view_of(element) {
            if handle.read(|stored| view2view_of(stored).is_some()) {
                handle.update(|stored| {
                    if let Some(spec) = stored
                        .get_mut(SPECIALIZATION_FIELD)
                        .and_then(Value::as_object_mut)
                    {
                        spec.insert(VIEW2VIEW_FIELD.to_string(), sent.clone());
                    }
                });
            }
        }

        if let Some(edit) = self.ctx.store.get(&element_key(id, workspace, LATEST, true)) {
            let merged = handle.snapshot();
            edit.update(|copy| {
                deep_merge(copy, merged);
                clean_element(copy, true);
            });
        }

        Ok(handle)
    }

    pub async fn update_elements(
        &self,
        elements: Vec<Value>,
        workspace: Option<&str>,
    ) -> MmsResult<Vec<EntryHandle>> {
        try_join_all(
            elements
                .into_iter()
                .map(|element| self.update_element(element, workspace)),
        )
        .await
    }

    /// Create an element. The server assigns the id; a null id is dropped
    /// before sending and a missing owner defaults to the holding bin.
    pub async fn create_element(
        &self,
        element: Value,
        workspace: Option<&str>,
    ) -> MmsResult<EntryHandle> {
        if has_field(&element, ID_FIELD) {
            return Err(ValidationError::IdentityNotAllowed {
                entity: ELEMENT_ENTITY.to_string(),
            }
            .into());
        }
        let mut element = element;
        let Some(obj) = element.as_object_mut() else {
            return Err(ValidationError::InvalidValue {
                field: "element".to_string(),
                reason: "must be a JSON object".to_string(),
            }
            .into());
        };
        obj.remove(ID_FIELD);
        if !obj.get(OWNER_FIELD).is_some_and(|owner| !owner.is_null()) {
            obj.insert(
                OWNER_FIELD.to_string(),
                Value::String(self.holding_bin_owner.to_string()),
            );
        }

        let n = for_workspace(workspace);
        let url = self.ctx.urls.post_elements(&n.workspace);
        let body = json!({ "elements": [element] });
        let data = self.ctx.transport.post(&url, Some(&body)).await?;
        let mut response = envelope_first(&data, "elements")?;
        let id = element_id(&response)
            .map(str::to_string)
            .ok_or_else(|| MmsError::malformed("created element has no id"))?;
        clean_element(&mut response, false);
        debug!(%id, "element created");
        Ok(self
            .ctx
            .store
            .put(&element_key(&id, &n.workspace, LATEST, false), response, true))
    }

    pub async fn create_elements(
        &self,
        elements: Vec<Value>,
        workspace: Option<&str>,
    ) -> MmsResult<Vec<EntryHandle>> {
        try_join_all(
            elements
                .into_iter()
                .map(|element| self.create_element(element, workspace)),
        )
        .await
    }

    /// True when an edit copy exists and differs from the canonical entry.
    pub fn is_dirty(&self, id: &str, workspace: Option<&str>) -> bool {
        let n = for_workspace(workspace);
        let Some(edit) = self
            .ctx
            .store
            .get(&element_key(id, &n.workspace, LATEST, true))
        else {
            return false;
        };
        match self.ctx.store.get(&element_key(id, &n.workspace, LATEST, false)) {
            Some(canonical) => edit.snapshot() != canonical.snapshot(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::UrlBuilder;
    use mms_test_utils::{fixtures, MockTransport};

    fn service(mock: Arc<MockTransport>) -> (ElementService, Arc<CacheStore>) {
        let store = Arc::new(CacheStore::new());
        let ctx = ServiceContext::new(mock, Arc::clone(&store), UrlBuilder::new(fixtures::BASE_URL));
        (ElementService::new(ctx, "holding_bin_project"), store)
    }

    #[test]
    fn test_view2view_of() {
        assert!(view2view_of(&json!({"specialization": {"view2view": []}})).is_some());
        assert!(view2view_of(&json!({"specialization": {}})).is_none());
        assert!(view2view_of(&json!({"name": "x"})).is_none());
    }

    #[test]
    fn test_is_dirty_tracks_edit_copy() {
        let (svc, store) = service(Arc::new(MockTransport::new()));
        assert!(!svc.is_dirty("a", None));
        store.put(&element_key("a", "master", "latest", false), json!({"sysmlid": "a"}), true);
        assert!(!svc.is_dirty("a", None));
        store.put(&element_key("a", "master", "latest", true), json!({"sysmlid": "a"}), true);
        assert!(!svc.is_dirty("a", None));
        store
            .get(&element_key("a", "master", "latest", true))
            .unwrap()
            .update(|v| v["name"] = json!("edited"));
        assert!(svc.is_dirty("a", None));
    }

    #[tokio::test]
    async fn test_create_rejects_non_object() {
        let mock = Arc::new(MockTransport::new());
        let (svc, _) = service(Arc::clone(&mock));
        let result = svc.create_element(json!("nope"), None).await;
        assert!(matches!(result, Err(MmsError::Validation(_))));
        assert_eq!(mock.total_calls(), 0);
    }
}
