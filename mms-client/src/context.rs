//! State shared by every service of a session.

use crate::url::UrlBuilder;
use mms_core::{normalize, Normalized, RequestOptions, Transport};
use mms_storage::CacheStore;
use std::sync::Arc;

/// Transport, cache and URL scheme shared by the services of one session.
#[derive(Clone)]
pub struct ServiceContext {
    pub transport: Arc<dyn Transport>,
    pub store: Arc<CacheStore>,
    pub urls: UrlBuilder,
}

impl ServiceContext {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<CacheStore>, urls: UrlBuilder) -> Self {
        Self {
            transport,
            store,
            urls,
        }
    }
}

/// Normalized parameters for a call that only takes a workspace.
pub(crate) fn for_workspace(workspace: Option<&str>) -> Normalized {
    normalize(&RequestOptions {
        workspace: workspace.map(str::to_string),
        ..RequestOptions::default()
    })
}

/// Normalized parameters for a call that takes a force flag and a workspace.
pub(crate) fn for_fetch(force: bool, workspace: Option<&str>) -> Normalized {
    normalize(&RequestOptions {
        force_update: Some(force),
        workspace: workspace.map(str::to_string),
        version: None,
    })
}
