//! Backend address scheme.
//!
//! Every URL is built from the configured service root. Element-scoped
//! endpoints carry a version suffix chosen by [`add_version`].

use mms_core::{ClientConfig, Version, LATEST};

/// Append a version selector to `url`.
///
/// `latest` leaves the URL unchanged, a timestamp (any value containing a
/// hyphen) becomes `?timestamp=`, anything else is a `/versions/` path.
pub fn add_version(url: String, version: &str) -> String {
    match Version::parse(version) {
        Version::Latest => url,
        Version::Timestamp(time) => format!("{url}?timestamp={time}"),
        Version::Revision(rev) => format!("{url}/versions/{rev}"),
    }
}

/// Builds backend URLs from the service root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlBuilder {
    root: String,
}

impl UrlBuilder {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.root())
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn element(&self, id: &str, workspace: &str, version: &str) -> String {
        add_version(
            format!("{}/workspaces/{workspace}/elements/{id}", self.root),
            version,
        )
    }

    /// Recursive owned-elements listing. Not versioned.
    pub fn owned_elements(&self, id: &str, workspace: &str) -> String {
        format!(
            "{}/workspaces/{workspace}/elements/{id}?recurse=true",
            self.root
        )
    }

    pub fn post_elements(&self, workspace: &str) -> String {
        format!("{}/workspaces/{workspace}/elements", self.root)
    }

    pub fn element_versions(&self, id: &str) -> String {
        format!("{}/javawebscripts/elements/{id}/versions", self.root)
    }

    pub fn element_search(&self, query: &str) -> String {
        format!("{}/javawebscripts/element/search?keyword={query}", self.root)
    }

    fn site(&self, site: &str, workspace: &str) -> String {
        format!("{}/workspaces/{workspace}/sites/{site}", self.root)
    }

    pub fn site_configs(&self, site: &str, workspace: &str) -> String {
        format!("{}/configurations", self.site(site, workspace))
    }

    pub fn config(&self, id: &str, site: &str, workspace: &str) -> String {
        format!("{}/configurations/{id}", self.site(site, workspace))
    }

    pub fn config_products(&self, id: &str, site: &str, workspace: &str) -> String {
        format!("{}/products", self.config(id, site, workspace))
    }

    pub fn config_snapshots(&self, id: &str, site: &str, workspace: &str) -> String {
        format!("{}/snapshots", self.config(id, site, workspace))
    }

    pub fn product_snapshots(&self, id: &str, site: &str, workspace: &str) -> String {
        format!("{}/products/{id}/snapshots", self.site(site, workspace))
    }

    pub fn site_products(&self, site: &str, workspace: &str) -> String {
        format!("{}/products", self.site(site, workspace))
    }

    pub fn document_views(&self, id: &str, version: &str, simple: bool) -> String {
        let url = add_version(
            format!("{}/javawebscripts/products/{id}/views", self.root),
            version,
        );
        if !simple {
            url
        } else if url.contains('?') {
            format!("{url}&simple=true")
        } else {
            format!("{url}?simple=true")
        }
    }

    pub fn view_elements(&self, id: &str, version: &str) -> String {
        add_version(
            format!("{}/javawebscripts/views/{id}/elements", self.root),
            version,
        )
    }

    pub fn sites(&self) -> String {
        format!("{}/rest/sites", self.root)
    }

    pub fn image(&self, id: &str, workspace: &str, version: &str) -> String {
        add_version(
            format!("{}/workspaces/{workspace}/artifacts/{id}", self.root),
            version,
        )
    }

    pub fn workspaces(&self) -> String {
        format!("{}/workspaces", self.root)
    }

    /// Diff of `source` against `target`, optionally pinned to timestamps.
    pub fn workspace_diff(
        &self,
        source: &str,
        target: &str,
        source_time: Option<&str>,
        target_time: Option<&str>,
    ) -> String {
        let mut url = format!("{}/diff?sourceWs={source}&targetWs={target}", self.root);
        if let Some(time) = source_time.filter(|t| *t != LATEST) {
            url.push_str(&format!("&sourceTimestamp={time}"));
        }
        if let Some(time) = target_time.filter(|t| *t != LATEST) {
            url.push_str(&format!("&targetTimestamp={time}"));
        }
        url
    }
}
