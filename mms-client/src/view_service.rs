//! Views and documents.
//!
//! Views and documents are elements, so reads and writes go through
//! [`ElementService`]. List endpoints here are cached as [`RefList`]s that
//! point at the per-element entries.

use crate::context::{for_fetch, for_workspace, ServiceContext};
use crate::element_service::ElementService;
use mms_core::{
    element_id, normalize, CacheKey, EntityKind, MmsError, MmsResult, RequestOptions,
    CONTAINS_FIELD, ID_FIELD, LATEST, READ_FIELD, SPECIALIZATION_FIELD, VIEW2VIEW_FIELD,
};
use mms_storage::{EntryHandle, RefList};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

/// Name given to a view created without one.
pub const DEFAULT_VIEW_NAME: &str = "Untitled View";

const CHILDREN_VIEWS: &str = "childrenViews";
const ALLOWED_ELEMENTS: &str = "allowedElements";
const DISPLAYED_ELEMENTS: &str = "displayedElements";

fn document_views_key(id: &str, workspace: &str, version: &str) -> CacheKey {
    CacheKey::kind(EntityKind::Products)
        .with(workspace)
        .with(id)
        .with(version)
        .with("views")
}

/// Minimal document update that adds `view_id` under `parent_view_id`.
///
/// Carries the document's id, read stamp and specialization, without
/// `contains`. The view is appended to the parent's `childrenViews` and
/// added as a leaf node of `view2view`.
fn add_view_node(document: &Value, view_id: &str, parent_view_id: &str) -> Value {
    let mut spec = document
        .get(SPECIALIZATION_FIELD)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    spec.remove(CONTAINS_FIELD);

    let nodes = spec
        .entry(VIEW2VIEW_FIELD)
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Some(nodes) = nodes.as_array_mut() {
        let parent = nodes
            .iter_mut()
            .find(|node| node.get("id").and_then(Value::as_str) == Some(parent_view_id));
        if let Some(parent) = parent.and_then(Value::as_object_mut) {
            let children = parent
                .entry(CHILDREN_VIEWS)
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Some(children) = children.as_array_mut() {
                children.push(json!(view_id));
            }
        }
        nodes.push(json!({ "id": view_id, CHILDREN_VIEWS: [] }));
    }

    let mut update = Map::new();
    for field in [ID_FIELD, READ_FIELD] {
        if let Some(value) = document.get(field) {
            update.insert(field.to_string(), value.clone());
        }
    }
    update.insert(SPECIALIZATION_FIELD.to_string(), Value::Object(spec));
    Value::Object(update)
}

/// Read stamp of the server copy carried by a conflict.
fn conflict_read_stamp(err: &MmsError) -> Option<Value> {
    let MmsError::Conflict(failure) = err else {
        return None;
    };
    failure
        .data
        .get("elements")?
        .get(0)?
        .get(READ_FIELD)
        .filter(|read| !read.is_null())
        .cloned()
}

/// View and document operations.
#[derive(Clone)]
pub struct ViewService {
    ctx: ServiceContext,
    elements: ElementService,
}

impl ViewService {
    pub fn new(ctx: ServiceContext, elements: ElementService) -> Self {
        Self { ctx, elements }
    }

    pub async fn get_view(&self, id: &str, options: &RequestOptions) -> MmsResult<EntryHandle> {
        self.elements.get_element(id, options).await
    }

    pub async fn get_views<S: AsRef<str>>(
        &self,
        ids: &[S],
        options: &RequestOptions,
    ) -> MmsResult<Vec<EntryHandle>> {
        self.elements.get_elements(ids, options).await
    }

    pub async fn get_document(&self, id: &str, options: &RequestOptions) -> MmsResult<EntryHandle> {
        self.elements.get_element(id, options).await
    }

    pub async fn update_view(&self, view: Value, workspace: Option<&str>) -> MmsResult<EntryHandle> {
        self.elements.update_element(view, workspace).await
    }

    pub async fn update_document(
        &self,
        document: Value,
        workspace: Option<&str>,
    ) -> MmsResult<EntryHandle> {
        self.elements.update_element(document, workspace).await
    }

    async fn cached_refs(
        &self,
        key: CacheKey,
        url: String,
        kind: &str,
        options: &RequestOptions,
    ) -> MmsResult<RefList> {
        if !normalize(options).force_update {
            if let Some(list) = self.ctx.store.get_refs(&key) {
                debug!(%key, "list cache hit");
                return Ok(list);
            }
        }
        let handles = self
            .elements
            .get_generic_elements(&url, kind, options)
            .await?;
        Ok(self.ctx.store.put_refs(&key, handles))
    }

    /// Elements shown in a view.
    pub async fn get_view_elements(
        &self,
        id: &str,
        options: &RequestOptions,
    ) -> MmsResult<RefList> {
        let n = normalize(options);
        let key = CacheKey::kind(EntityKind::Views)
            .with(n.workspace.as_str())
            .with(id)
            .with(n.version.as_str())
            .with("elements");
        let url = self.ctx.urls.view_elements(id, &n.version);
        self.cached_refs(key, url, "elements", options).await
    }

    /// Views of a document. `simple` asks the backend for a reduced payload.
    pub async fn get_document_views(
        &self,
        id: &str,
        options: &RequestOptions,
        simple: bool,
    ) -> MmsResult<RefList> {
        let n = normalize(options);
        let key = document_views_key(id, &n.workspace, &n.version);
        let url = self.ctx.urls.document_views(id, &n.version, simple);
        self.cached_refs(key, url, "views", options).await
    }

    /// Documents (products) of a site.
    pub async fn get_site_documents(
        &self,
        site: &str,
        force: bool,
        workspace: Option<&str>,
    ) -> MmsResult<RefList> {
        let n = for_fetch(force, workspace);
        let key = CacheKey::kind(EntityKind::Sites)
            .with(n.workspace.as_str())
            .with(site)
            .with("products");
        let url = self.ctx.urls.site_products(site, &n.workspace);
        let options = RequestOptions::new()
            .force(n.force_update)
            .workspace(n.workspace);
        self.cached_refs(key, url, "products", &options).await
    }

    /// Attach `view_id` to a document below `parent_view_id`.
    ///
    /// A conflict that survives the element-level retry is retried once more
    /// with the server's read stamp. When `view` is given it is appended to
    /// the cached document views list, if one exists.
    pub async fn add_view_to_document(
        &self,
        view_id: &str,
        document_id: &str,
        parent_view_id: &str,
        workspace: Option<&str>,
        view: Option<EntryHandle>,
    ) -> MmsResult<EntryHandle> {
        let n = for_workspace(workspace);
        let options = RequestOptions::new().workspace(n.workspace.clone());
        let document = self.get_document(document_id, &options).await?;
        let mut update = document.read(|doc| add_view_node(doc, view_id, parent_view_id));

        let updated = match self.update_document(update.clone(), workspace).await {
            Err(err) => match conflict_read_stamp(&err) {
                Some(read) => {
                    info!(document_id, view_id, "retrying view insertion with server read stamp");
                    if let Some(obj) = update.as_object_mut() {
                        obj.insert(READ_FIELD.to_string(), read);
                    }
                    self.update_document(update, workspace).await?
                }
                None => return Err(err),
            },
            Ok(handle) => handle,
        };

        if let Some(view) = view {
            let key = document_views_key(document_id, &n.workspace, LATEST);
            if let Some(list) = self.ctx.store.get_refs(&key) {
                list.push(view);
            }
        }
        Ok(updated)
    }

    /// Create a view owned by `owner_id`, optionally attaching it to a document.
    ///
    /// The new view starts with one paragraph that displays its own
    /// documentation.
    pub async fn create_view(
        &self,
        owner_id: &str,
        name: Option<&str>,
        document_id: Option<&str>,
        workspace: Option<&str>,
    ) -> MmsResult<EntryHandle> {
        let name = name.filter(|n| !n.is_empty()).unwrap_or(DEFAULT_VIEW_NAME);
        let view = json!({
            SPECIALIZATION_FIELD: { "type": "View", CONTAINS_FIELD: [] },
            "owner": owner_id,
            "name": name,
            "documentation": "",
        });
        let created = self.elements.create_element(view, workspace).await?;

        let mut seeded = created.snapshot();
        let id = element_id(&seeded)
            .map(str::to_string)
            .ok_or_else(|| MmsError::malformed("created view has no id"))?;
        if let Some(obj) = seeded.as_object_mut() {
            let spec = obj
                .entry(SPECIALIZATION_FIELD)
                .or_insert_with(|| json!({ "type": "View" }));
            if let Some(spec) = spec.as_object_mut() {
                spec.insert(
                    CONTAINS_FIELD.to_string(),
                    json!([{
                        "type": "Paragraph",
                        "sourceType": "reference",
                        "source": id,
                        "sourceProperty": "documentation",
                    }]),
                );
                spec.insert(ALLOWED_ELEMENTS.to_string(), json!([id]));
                spec.insert(DISPLAYED_ELEMENTS.to_string(), json!([id]));
                spec.insert(CHILDREN_VIEWS.to_string(), json!([]));
            }
        }
        let updated = self.elements.update_element(seeded, workspace).await?;

        if let Some(document_id) = document_id {
            self.add_view_to_document(&id, document_id, owner_id, workspace, Some(updated.clone()))
                .await?;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mms_core::HttpFailure;

    #[test]
    fn test_add_view_node_under_parent() {
        let doc = json!({
            "sysmlid": "doc", "read": "r1", "name": "Doc",
            "specialization": {
                "type": "Product",
                "contains": [{"type": "Paragraph"}],
                "view2view": [{"id": "doc", "childrenViews": ["v1"]}, {"id": "v1", "childrenViews": []}]
            }
        });
        let update = add_view_node(&doc, "v2", "doc");
        assert_eq!(
            update,
            json!({
                "sysmlid": "doc", "read": "r1",
                "specialization": {
                    "type": "Product",
                    "view2view": [
                        {"id": "doc", "childrenViews": ["v1", "v2"]},
                        {"id": "v1", "childrenViews": []},
                        {"id": "v2", "childrenViews": []}
                    ]
                }
            })
        );
    }

    #[test]
    fn test_add_view_node_without_view2view() {
        let doc = json!({"sysmlid": "doc", "specialization": {"type": "Product"}});
        let update = add_view_node(&doc, "v1", "missing");
        assert_eq!(
            update["specialization"]["view2view"],
            json!([{"id": "v1", "childrenViews": []}])
        );
        assert!(update.get("read").is_none());
    }

    #[test]
    fn test_conflict_read_stamp() {
        let err = MmsError::Conflict(HttpFailure::from_status(
            409,
            json!({"elements": [{"sysmlid": "doc", "read": "r9"}]}),
        ));
        assert_eq!(conflict_read_stamp(&err), Some(json!("r9")));

        let err = MmsError::Conflict(HttpFailure::from_status(409, json!({"message": "x"})));
        assert_eq!(conflict_read_stamp(&err), None);

        let err = MmsError::from_http(500, json!({"elements": [{"read": "r9"}]}));
        assert_eq!(conflict_read_stamp(&err), None);
    }
}
