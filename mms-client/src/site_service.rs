//! Site listing and the session's current site.

use crate::context::ServiceContext;
use mms_core::{CacheKey, EntityKind, MmsError, MmsResult, Transport, MASTER_WORKSPACE};
use mms_storage::{CacheStore, DeriveFn, Derived, EntryHandle, InFlightRegistry, RefList};
use serde_json::{json, Value};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

const SITES_SIGNATURE: &str = "getSites";
const SITE_NAME_FIELD: &str = "name";

fn sites_key() -> CacheKey {
    CacheKey::kind(EntityKind::Sites).with(MASTER_WORKSPACE)
}

fn derive_by_name() -> DeriveFn {
    Arc::new(|site: &Value, _: usize| {
        let name = site.get(SITE_NAME_FIELD)?.as_str()?;
        Some(Derived::merge(sites_key().with(name), site.clone()))
    })
}

async fn fetch_sites(
    transport: Arc<dyn Transport>,
    store: Arc<CacheStore>,
    url: String,
) -> MmsResult<RefList> {
    let data = transport.get(&url).await?;
    let Value::Array(sites) = data else {
        return Err(MmsError::malformed("site listing is not an array"));
    };
    Ok(store.put_list(&sites_key(), sites, true, Some(&derive_by_name())))
}

/// Sites visible to the current user.
#[derive(Clone)]
pub struct SiteService {
    ctx: ServiceContext,
    requests: Arc<InFlightRegistry<RefList>>,
    current: Arc<RwLock<String>>,
}

impl SiteService {
    /// Service whose current site starts as `default_site`.
    pub fn new(ctx: ServiceContext, default_site: impl Into<String>) -> Self {
        Self {
            ctx,
            requests: Arc::new(InFlightRegistry::new()),
            current: Arc::new(RwLock::new(default_site.into())),
        }
    }

    /// Name of the site the session is working in.
    pub fn current_site(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_current_site(&self, name: impl Into<String>) {
        let name = name.into();
        debug!(site = %name, "current site changed");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = name;
    }

    /// The site list, fetched once and then served from cache.
    ///
    /// Each site is also cached under `[sites, master, name]`; the list holds
    /// those same entries.
    pub async fn get_sites(&self) -> MmsResult<RefList> {
        if let Some(pending) = self.requests.join(SITES_SIGNATURE) {
            return pending.await;
        }
        if let Some(cached) = self.ctx.store.get_refs(&sites_key()) {
            debug!("site list cache hit");
            return Ok(cached);
        }

        let transport = Arc::clone(&self.ctx.transport);
        let store = Arc::clone(&self.ctx.store);
        let url = self.ctx.urls.sites();
        self.requests
            .register_or_join(SITES_SIGNATURE, move || fetch_sites(transport, store, url))
            .await
    }

    /// One site by name. Not found when the listing does not contain it.
    pub async fn get_site(&self, name: &str) -> MmsResult<EntryHandle> {
        self.get_sites().await?;
        self.ctx
            .store
            .get(&sites_key().with(name))
            .ok_or_else(|| MmsError::from_http(404, json!({ "message": "Site not found" })))
    }
}
