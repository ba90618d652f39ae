//! Version addressing for element reads.

use std::fmt;

/// Workspace used whenever a caller does not name one.
pub const MASTER_WORKSPACE: &str = "master";

/// Literal version string that addresses the head of a workspace.
pub const LATEST: &str = "latest";

/// Returns true when `version` should be sent as a timestamp.
///
/// The rule is exactly "contains a hyphen". A revision string that happens
/// to contain a hyphen is classified as a timestamp; callers rely on this.
pub fn is_timestamp(version: &str) -> bool {
    version.contains('-')
}

/// A version selector: head, numbered revision, or point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Version {
    #[default]
    Latest,
    Revision(String),
    Timestamp(String),
}

impl Version {
    /// Classify a raw version string. Empty input means [`Version::Latest`].
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() || raw == LATEST {
            Self::Latest
        } else if is_timestamp(raw) {
            Self::Timestamp(raw.to_string())
        } else {
            Self::Revision(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Latest => LATEST,
            Self::Revision(v) | Self::Timestamp(v) => v,
        }
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, Self::Latest)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Version {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}
