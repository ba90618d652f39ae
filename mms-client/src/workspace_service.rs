//! Workspaces: the branch tree every element read is scoped to.

use crate::context::ServiceContext;
use mms_core::{
    envelope_list, CacheKey, EntityKind, MmsError, MmsResult, Transport, MASTER_WORKSPACE,
};
use mms_storage::{CacheStore, DeriveFn, Derived, EntryHandle, InFlightRegistry, RefList};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

const WORKSPACES_SIGNATURE: &str = "getAllWorkspaces";
const WORKSPACES: &str = "workspaces";
const NAME_FIELD: &str = "name";
const PARENT_FIELD: &str = "parent";

fn workspaces_key() -> CacheKey {
    CacheKey::kind(EntityKind::Workspaces).with(MASTER_WORKSPACE)
}

/// Seeds `[workspaces, parent, name]`. Root workspaces have no parent and no
/// entry of their own.
fn derive_by_parent() -> DeriveFn {
    Arc::new(|workspace: &Value, _: usize| {
        let name = workspace.get(NAME_FIELD)?.as_str()?;
        let parent = workspace.get(PARENT_FIELD)?.as_str()?;
        Some(Derived::merge(
            CacheKey::kind(EntityKind::Workspaces).with(parent).with(name),
            workspace.clone(),
        ))
    })
}

async fn fetch_workspaces(
    transport: Arc<dyn Transport>,
    store: Arc<CacheStore>,
    url: String,
) -> MmsResult<RefList> {
    let data = transport.get(&url).await?;
    let workspaces = envelope_list(&data, WORKSPACES)?;
    debug!(count = workspaces.len(), "caching workspaces");
    Ok(store.put_list(&workspaces_key(), workspaces, true, Some(&derive_by_parent())))
}

/// Workspace listing and comparison.
#[derive(Clone)]
pub struct WorkspaceService {
    ctx: ServiceContext,
    requests: Arc<InFlightRegistry<RefList>>,
}

impl WorkspaceService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            ctx,
            requests: Arc::new(InFlightRegistry::new()),
        }
    }

    /// Every workspace, fetched once and then served from cache.
    pub async fn get_all(&self) -> MmsResult<RefList> {
        if let Some(pending) = self.requests.join(WORKSPACES_SIGNATURE) {
            return pending.await;
        }
        if let Some(cached) = self.ctx.store.get_refs(&workspaces_key()) {
            debug!("workspace list cache hit");
            return Ok(cached);
        }

        let transport = Arc::clone(&self.ctx.transport);
        let store = Arc::clone(&self.ctx.store);
        let url = self.ctx.urls.workspaces();
        self.requests
            .register_or_join(WORKSPACES_SIGNATURE, move || {
                fetch_workspaces(transport, store, url)
            })
            .await
    }

    /// One workspace of the listing by name.
    pub async fn get(&self, name: &str) -> MmsResult<EntryHandle> {
        let all = self.get_all().await?;
        all.handles()
            .into_iter()
            .find(|handle| handle.read(|ws| ws.get(NAME_FIELD).and_then(Value::as_str) == Some(name)))
            .ok_or_else(|| MmsError::from_http(404, json!({ "message": "Workspace not found" })))
    }

    /// Differences between two workspaces, optionally pinned to timestamps.
    /// Never cached.
    pub async fn diff(
        &self,
        source: &str,
        target: &str,
        source_time: Option<&str>,
        target_time: Option<&str>,
    ) -> MmsResult<Value> {
        let url = self
            .ctx
            .urls
            .workspace_diff(source, target, source_time, target_time);
        Ok(self.ctx.transport.get(&url).await?)
    }
}
