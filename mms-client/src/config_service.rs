//! Configurations, their products and snapshots.
//!
//! List fetches seed per-item entries through derived puts, so fetching a
//! site's configurations also populates `[configs, ws, id]` for each one.
//! The cached list holds those same entries, so saving a configuration is
//! visible through the site list too.

use crate::context::{for_fetch, for_workspace, ServiceContext};
use mms_core::{
    element_key, envelope_list, has_field, CacheKey, EntityKind, MmsError, MmsResult,
    ValidationError, ID_FIELD, LATEST,
};
use mms_storage::{DeriveFn, Derived, EntryHandle, RefList};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Entity name used in config validation errors.
pub const CONFIG_ENTITY: &str = "Config";

const CONFIG_ID_FIELD: &str = "id";
const CONFIGURATIONS: &str = "configurations";
const PRODUCTS: &str = "products";
const SNAPSHOTS: &str = "snapshots";
const SITE_CONFIGS_SEGMENT: &str = "configs";

fn config_key(id: &str, workspace: &str) -> CacheKey {
    CacheKey::kind(EntityKind::Configs).with(workspace).with(id)
}

fn site_configs_key(site: &str, workspace: &str) -> CacheKey {
    CacheKey::kind(EntityKind::Sites)
        .with(workspace)
        .with(site)
        .with(SITE_CONFIGS_SEGMENT)
}

/// Seeds `[kind, ws, id]` from each item's `id`.
fn derive_by_id(kind: EntityKind, workspace: &str) -> DeriveFn {
    let workspace = workspace.to_string();
    Arc::new(move |item: &Value, _: usize| {
        let id = item.get(CONFIG_ID_FIELD)?.as_str()?;
        Some(Derived::merge(
            CacheKey::kind(kind).with(workspace.as_str()).with(id),
            item.clone(),
        ))
    })
}

/// Seeds the latest element entry of each product.
fn derive_product_elements(workspace: &str) -> DeriveFn {
    let workspace = workspace.to_string();
    Arc::new(move |item: &Value, _: usize| {
        let id = item.get(ID_FIELD)?.as_str()?;
        Some(Derived::merge(
            element_key(id, &workspace, LATEST, false),
            item.clone(),
        ))
    })
}

/// The first configuration of a response envelope, or the body itself.
fn first_configuration(data: Value) -> Value {
    match data.get(CONFIGURATIONS).and_then(Value::as_array) {
        Some(items) if !items.is_empty() => items[0].clone(),
        _ => data,
    }
}

/// Configurations of a site and the products and snapshots attached to them.
#[derive(Clone)]
pub struct ConfigService {
    ctx: ServiceContext,
}

impl ConfigService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    fn cached(&self, key: &CacheKey, force: bool) -> Option<EntryHandle> {
        if force {
            return None;
        }
        let hit = self.ctx.store.get(key);
        if hit.is_some() {
            debug!(%key, "cache hit");
        }
        hit
    }

    fn cached_list(&self, key: &CacheKey, force: bool) -> Option<RefList> {
        if force {
            return None;
        }
        let hit = self.ctx.store.get_refs(key);
        if hit.is_some() {
            debug!(%key, "list cache hit");
        }
        hit
    }

    async fn fetch_list(
        &self,
        url: &str,
        kind: &str,
        key: &CacheKey,
        derive: DeriveFn,
    ) -> MmsResult<RefList> {
        let data = self.ctx.transport.get(url).await?;
        let items = envelope_list(&data, kind)?;
        debug!(%key, count = items.len(), "caching list");
        Ok(self.ctx.store.put_list(key, items, false, Some(&derive)))
    }

    /// All configurations of a site.
    pub async fn get_site_configs(
        &self,
        site: &str,
        workspace: Option<&str>,
        force: bool,
    ) -> MmsResult<RefList> {
        let n = for_fetch(force, workspace);
        let key = site_configs_key(site, &n.workspace);
        if let Some(hit) = self.cached_list(&key, n.force_update) {
            return Ok(hit);
        }
        let url = self.ctx.urls.site_configs(site, &n.workspace);
        self.fetch_list(
            &url,
            CONFIGURATIONS,
            &key,
            derive_by_id(EntityKind::Configs, &n.workspace),
        )
        .await
    }

    pub async fn get_config(
        &self,
        id: &str,
        site: &str,
        workspace: Option<&str>,
        force: bool,
    ) -> MmsResult<EntryHandle> {
        let n = for_fetch(force, workspace);
        let key = config_key(id, &n.workspace);
        if let Some(hit) = self.cached(&key, n.force_update) {
            return Ok(hit);
        }
        let data = self
            .ctx
            .transport
            .get(&self.ctx.urls.config(id, site, &n.workspace))
            .await?;
        Ok(self
            .ctx
            .store
            .put(&key, first_configuration(data), true))
    }

    /// Products attached to a configuration. Each product also lands in the
    /// element cache under its latest key.
    pub async fn get_config_products(
        &self,
        id: &str,
        site: &str,
        workspace: Option<&str>,
        force: bool,
    ) -> MmsResult<RefList> {
        let n = for_fetch(force, workspace);
        let key = config_key(id, &n.workspace).with(PRODUCTS);
        if let Some(hit) = self.cached_list(&key, n.force_update) {
            return Ok(hit);
        }
        let url = self.ctx.urls.config_products(id, site, &n.workspace);
        self.fetch_list(&url, PRODUCTS, &key, derive_product_elements(&n.workspace))
            .await
    }

    pub async fn get_config_snapshots(
        &self,
        id: &str,
        site: &str,
        workspace: Option<&str>,
        force: bool,
    ) -> MmsResult<RefList> {
        let n = for_fetch(force, workspace);
        let key = config_key(id, &n.workspace).with(SNAPSHOTS);
        if let Some(hit) = self.cached_list(&key, n.force_update) {
            return Ok(hit);
        }
        let url = self.ctx.urls.config_snapshots(id, site, &n.workspace);
        self.fetch_list(
            &url,
            SNAPSHOTS,
            &key,
            derive_by_id(EntityKind::Snapshots, &n.workspace),
        )
        .await
    }

    pub async fn get_product_snapshots(
        &self,
        id: &str,
        site: &str,
        workspace: Option<&str>,
        force: bool,
    ) -> MmsResult<RefList> {
        let n = for_fetch(force, workspace);
        let key = CacheKey::kind(EntityKind::Products)
            .with(n.workspace.as_str())
            .with(id)
            .with(SNAPSHOTS);
        if let Some(hit) = self.cached_list(&key, n.force_update) {
            return Ok(hit);
        }
        let url = self.ctx.urls.product_snapshots(id, site, &n.workspace);
        self.fetch_list(
            &url,
            SNAPSHOTS,
            &key,
            derive_by_id(EntityKind::Snapshots, &n.workspace),
        )
        .await
    }

    /// Save an existing configuration. The config must carry its `id`.
    pub async fn update_config(
        &self,
        config: Value,
        site: &str,
        workspace: Option<&str>,
    ) -> MmsResult<EntryHandle> {
        let id = config
            .get(CONFIG_ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ValidationError::MissingIdentity {
                entity: CONFIG_ENTITY.to_string(),
            })?;
        let n = for_workspace(workspace);
        let url = self.ctx.urls.site_configs(site, &n.workspace);
        let body = json!({ CONFIGURATIONS: [config] });
        let data = self.ctx.transport.post(&url, Some(&body)).await?;
        Ok(self.ctx.store.put(
            &config_key(&id, &n.workspace),
            first_configuration(data),
            true,
        ))
    }

    /// Create a configuration and append it to the cached site list, if any.
    pub async fn create_config(
        &self,
        config: Value,
        site: &str,
        workspace: Option<&str>,
    ) -> MmsResult<EntryHandle> {
        if has_field(&config, CONFIG_ID_FIELD) {
            return Err(ValidationError::IdentityNotAllowed {
                entity: CONFIG_ENTITY.to_string(),
            }
            .into());
        }
        let n = for_workspace(workspace);
        let url = self.ctx.urls.site_configs(site, &n.workspace);
        let body = json!({ CONFIGURATIONS: [config] });
        let data = self.ctx.transport.post(&url, Some(&body)).await?;
        let created = first_configuration(data);
        let id = created
            .get(CONFIG_ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| MmsError::malformed("created configuration has no id"))?;

        let handle = self
            .ctx
            .store
            .put(&config_key(&id, &n.workspace), created, true);
        if let Some(list) = self.ctx.store.get_refs(&site_configs_key(site, &n.workspace)) {
            list.push(handle.clone());
        }
        Ok(handle)
    }

    /// Replace the snapshots attached to a configuration.
    pub async fn update_config_snapshots(
        &self,
        id: &str,
        snapshots: Vec<Value>,
        site: &str,
        workspace: Option<&str>,
    ) -> MmsResult<RefList> {
        let n = for_workspace(workspace);
        let url = self.ctx.urls.config_snapshots(id, site, &n.workspace);
        let body = json!({ SNAPSHOTS: snapshots });
        let data = self.ctx.transport.post(&url, Some(&body)).await?;
        let items = envelope_list(&data, SNAPSHOTS)?;
        let derive = derive_by_id(EntityKind::Snapshots, &n.workspace);
        Ok(self.ctx.store.put_list(
            &config_key(id, &n.workspace).with(SNAPSHOTS),
            items,
            false,
            Some(&derive),
        ))
    }

    /// Replace the products attached to a configuration.
    pub async fn update_config_products(
        &self,
        id: &str,
        products: Vec<Value>,
        site: &str,
        workspace: Option<&str>,
    ) -> MmsResult<RefList> {
        let n = for_workspace(workspace);
        let url = self.ctx.urls.config_products(id, site, &n.workspace);
        let body = json!({ PRODUCTS: products });
        let data = self.ctx.transport.post(&url, Some(&body)).await?;
        let items = envelope_list(&data, PRODUCTS)?;
        let derive = derive_product_elements(&n.workspace);
        Ok(self.ctx.store.put_list(
            &config_key(id, &n.workspace).with(PRODUCTS),
            items,
            false,
            Some(&derive),
        ))
    }

    /// Ask the backend to snapshot a product.
    pub async fn create_snapshot(
        &self,
        product_id: &str,
        site: &str,
        workspace: Option<&str>,
    ) -> MmsResult<()> {
        let n = for_workspace(workspace);
        let url = self.ctx.urls.product_snapshots(product_id, site, &n.workspace);
        self.ctx.transport.post(&url, None).await?;
        Ok(())
    }

    /// Post a snapshot artifact back to the product it was taken from.
    pub async fn create_snapshot_artifact(
        &self,
        snapshot: Value,
        site: &str,
        workspace: Option<&str>,
    ) -> MmsResult<()> {
        let product_id = snapshot
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ValidationError::RequiredFieldMissing {
                field: ID_FIELD.to_string(),
            })?;
        let n = for_workspace(workspace);
        let url = self
            .ctx
            .urls
            .product_snapshots(&product_id, site, &n.workspace);
        let body = json!({ SNAPSHOTS: [snapshot] });
        self.ctx.transport.post(&url, Some(&body)).await?;
        Ok(())
    }
}
