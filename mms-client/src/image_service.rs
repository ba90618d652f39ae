//! Diagram image links.

use crate::context::ServiceContext;
use mms_core::{normalize, CacheKey, EntityKind, MmsError, MmsResult, RequestOptions};
use serde_json::Value;
use tracing::debug;

/// Prefix the repository serves artifact paths under.
pub const ARTIFACT_PREFIX: &str = "/alfresco";

fn artifact_url_key(id: &str, workspace: &str, version: &str) -> CacheKey {
    CacheKey::kind(EntityKind::ArtifactUrls)
        .with(id)
        .with(workspace)
        .with(version)
}

/// Path of the first artifact in an artifact listing.
fn first_artifact_path(data: &Value) -> MmsResult<String> {
    data.get("artifacts")
        .and_then(|artifacts| artifacts.get(0))
        .and_then(|artifact| artifact.get("url"))
        .and_then(Value::as_str)
        .map(|url| format!("{ARTIFACT_PREFIX}{url}"))
        .ok_or_else(|| MmsError::malformed("response has no artifact url"))
}

/// Resolves diagram ids to the link of their rendered image.
#[derive(Clone)]
pub struct ImageService {
    ctx: ServiceContext,
}

impl ImageService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Image link of diagram `id`, cached per workspace and version.
    pub async fn get_image_url(&self, id: &str, options: &RequestOptions) -> MmsResult<String> {
        let n = normalize(options);
        let key = artifact_url_key(id, &n.workspace, &n.version);
        if !n.force_update {
            if let Some(cached) = self.ctx.store.get(&key) {
                if let Some(url) = cached.read(|value| value.as_str().map(str::to_string)) {
                    debug!(%key, "image url cache hit");
                    return Ok(url);
                }
            }
        }

        let data = self
            .ctx
            .transport
            .get(&self.ctx.urls.image(id, &n.workspace, &n.version))
            .await?;
        let url = first_artifact_path(&data)?;
        self.ctx.store.put(&key, Value::String(url.clone()), false);
        Ok(url)
    }
}
