//! Hierarchical cache keys and request normalization.
//!
//! Keys are ordered segment lists such as `[elements, master, id, latest]`.
//! They are flattened into a single string by joining on [`KEY_DELIMITER`].
//! A segment that itself contains the delimiter can collide with a different
//! key; segments are not escaped.

use crate::version::{LATEST, MASTER_WORKSPACE};
use std::fmt;

/// Delimiter used when flattening a key into its storage string.
pub const KEY_DELIMITER: &str = "|";

/// Trailing segment that marks the edit copy of an element.
pub const EDIT_SEGMENT: &str = "edit";

/// Leading segment of a key: the kind of thing stored under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Elements,
    Configs,
    Snapshots,
    Products,
    Sites,
    Views,
    Workspaces,
    ArtifactUrls,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Elements => "elements",
            Self::Configs => "configs",
            Self::Snapshots => "snapshots",
            Self::Products => "products",
            Self::Sites => "sites",
            Self::Views => "views",
            Self::Workspaces => "workspaces",
            Self::ArtifactUrls => "artifactUrl",
        }
    }
}

/// Ordered, hierarchical cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    segments: Vec<String>,
}

impl CacheKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Start a key with an entity kind segment.
    pub fn kind(kind: EntityKind) -> Self {
        Self::new([kind.as_str()])
    }

    /// Append a segment.
    pub fn with(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_edit(&self) -> bool {
        self.segments.last().map(String::as_str) == Some(EDIT_SEGMENT)
    }

    /// Flatten into the storage string.
    pub fn joined(&self) -> String {
        self.segments.join(KEY_DELIMITER)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl<const N: usize> From<[&str; N]> for CacheKey {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}

/// Optional request parameters as supplied by a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub force_update: Option<bool>,
    pub workspace: Option<String>,
    pub version: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always go to the server, even when cached.
    pub fn force(mut self, force: bool) -> Self {
        self.force_update = Some(force);
        self
    }

    pub fn workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Request parameters with every default filled in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Normalized {
    pub force_update: bool,
    pub workspace: String,
    pub version: String,
}

fn or_default(value: Option<&str>, default: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

/// Fill defaults: not forced, `master` workspace, `latest` version.
///
/// Empty strings count as absent.
pub fn normalize(options: &RequestOptions) -> Normalized {
    Normalized {
        force_update: options.force_update.unwrap_or(false),
        workspace: or_default(options.workspace.as_deref(), MASTER_WORKSPACE),
        version: or_default(options.version.as_deref(), LATEST),
    }
}

/// Key for an element: `[elements, ws, id, version]`, plus `edit` for the
/// edit copy. Empty workspace/version fall back to the defaults.
pub fn element_key(id: &str, workspace: &str, version: &str, edit: bool) -> CacheKey {
    let key = CacheKey::kind(EntityKind::Elements)
        .with(or_default(Some(workspace), MASTER_WORKSPACE))
        .with(id)
        .with(or_default(Some(version), LATEST));
    if edit {
        key.with(EDIT_SEGMENT)
    } else {
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_defaults() {
        let n = normalize(&RequestOptions::new());
        assert!(!n.force_update);
        assert_eq!(n.workspace, "master");
        assert_eq!(n.version, "latest");
    }

    #[test]
    fn test_normalize_empty_strings_are_absent() {
        let n = normalize(&RequestOptions::new().workspace("").version(""));
        assert_eq!(n.workspace, "master");
        assert_eq!(n.version, "latest");
    }

    #[test]
    fn test_normalize_keeps_supplied_values() {
        let n = normalize(&RequestOptions::new().force(true).workspace("ws1").version("12"));
        assert!(n.force_update);
        assert_eq!(n.workspace, "ws1");
        assert_eq!(n.version, "12");
    }

    #[test]
    fn test_element_key_shape() {
        let key = element_key("abc", "master", "latest", false);
        assert_eq!(key.segments(), &["elements", "master", "abc", "latest"]);
        assert_eq!(key.joined(), "elements|master|abc|latest");
        assert!(!key.is_edit());

        let edit = element_key("abc", "", "", true);
        assert_eq!(edit.joined(), "elements|master|abc|latest|edit");
        assert!(edit.is_edit());
    }

    #[test]
    fn test_segment_order_is_significant() {
        let a = CacheKey::from(["configs", "master", "x"]);
        let b = CacheKey::from(["configs", "x", "master"]);
        assert_ne!(a.joined(), b.joined());
    }

    /// Segments are not escaped, so a delimiter inside a segment collides.
    #[test]
    fn test_delimiter_in_segment_collides() {
        let a = CacheKey::from(["a|b", "c"]);
        let b = CacheKey::from(["a", "b|c"]);
        assert_eq!(a.joined(), b.joined());
    }
}
