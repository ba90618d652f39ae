//! One client session: a cache, a transport and the services over them.

use crate::config_service::ConfigService;
use crate::context::ServiceContext;
use crate::element_service::ElementService;
use crate::image_service::ImageService;
use crate::rest::RestTransport;
use crate::site_service::SiteService;
use crate::url::UrlBuilder;
use crate::view_service::ViewService;
use crate::workspace_service::WorkspaceService;
use mms_core::{ClientConfig, MmsResult, Transport};
use mms_storage::{CacheStats, CacheStore};
use std::sync::Arc;
use tracing::debug;

/// Owns the cache for its lifetime. Dropping the session drops the cache.
pub struct Session {
    config: ClientConfig,
    store: Arc<CacheStore>,
    elements: ElementService,
    views: ViewService,
    configs: ConfigService,
    sites: SiteService,
    workspaces: WorkspaceService,
    images: ImageService,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let store = Arc::new(CacheStore::new());
        let ctx = ServiceContext::new(
            transport,
            Arc::clone(&store),
            UrlBuilder::from_config(&config),
        );
        let elements = ElementService::new(ctx.clone(), config.holding_bin_owner.clone());
        Self {
            views: ViewService::new(ctx.clone(), elements.clone()),
            configs: ConfigService::new(ctx.clone()),
            sites: SiteService::new(ctx.clone(), config.default_site.clone()),
            workspaces: WorkspaceService::new(ctx.clone()),
            images: ImageService::new(ctx),
            elements,
            store,
            config,
        }
    }

    /// Session over the REST transport described by `config`.
    pub fn connect(config: ClientConfig) -> MmsResult<Self> {
        config.validate()?;
        let transport = RestTransport::new(&config)?;
        debug!(base_url = %config.base_url, "session connected");
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn elements(&self) -> &ElementService {
        &self.elements
    }

    pub fn views(&self) -> &ViewService {
        &self.views
    }

    pub fn configs(&self) -> &ConfigService {
        &self.configs
    }

    pub fn sites(&self) -> &SiteService {
        &self.sites
    }

    pub fn workspaces(&self) -> &WorkspaceService {
        &self.workspaces
    }

    pub fn images(&self) -> &ImageService {
        &self.images
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    /// Forget every cached entry.
    pub fn clear(&self) {
        self.store.clear();
    }
}
