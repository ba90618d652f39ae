//! Error types for MMS client operations

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Map an HTTP status to the message category the UI layer switches on.
///
/// The four named categories plus the `"Failed"` fallback are a fixed
/// contract with consumers and must not be extended or reworded.
pub fn status_message(status: u16) -> &'static str {
    match status {
        404 => "Not Found",
        500 => "Server Error",
        401 | 403 => "Permission Error",
        409 => "Conflict",
        _ => "Failed",
    }
}

/// Structured reason for a failed backend call: `{status, message, data}`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpFailure {
    /// HTTP status code, or 0 when the request never produced a response.
    pub status: u16,
    /// Category message derived from `status`.
    pub message: String,
    /// Response body as returned by the backend (`Null` when absent).
    pub data: Value,
}

impl HttpFailure {
    /// Build the reason object for a status, applying [`status_message`].
    pub fn from_status(status: u16, data: Value) -> Self {
        Self {
            status,
            message: status_message(status).to_string(),
            data,
        }
    }
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (status {})", self.message, self.status)
    }
}

/// Validation errors. These are raised before any request is sent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{entity} id not found, create {entity} first")]
    MissingIdentity { entity: String },

    #[error("{entity} create cannot have id")]
    IdentityNotAllowed { entity: String },

    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or MMS_CLIENT_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Master error type for all MMS client errors.
///
/// Every variant is `Clone` so one failure can be delivered to all callers
/// that joined the same in-flight request.
#[derive(Debug, Clone, Error)]
pub enum MmsError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Network error: {0}")]
    Network(HttpFailure),

    #[error("Conflict: {0}")]
    Conflict(HttpFailure),

    #[error("Not found: {0}")]
    NotFound(HttpFailure),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Malformed response: {reason}")]
    Malformed { reason: String },
}

impl MmsError {
    /// Route a failed HTTP exchange to the matching variant.
    pub fn from_http(status: u16, data: Value) -> Self {
        let failure = HttpFailure::from_status(status, data);
        match status {
            404 => Self::NotFound(failure),
            409 => Self::Conflict(failure),
            _ => Self::Network(failure),
        }
    }

    /// Shorthand for a response that lacks the expected envelope shape.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    /// The structured reason object, for variants that came from the backend.
    pub fn reason(&self) -> Option<&HttpFailure> {
        match self {
            Self::Network(f) | Self::Conflict(f) | Self::NotFound(f) => Some(f),
            Self::Validation(_) | Self::Config(_) | Self::Malformed { .. } => None,
        }
    }

    /// Status code reported to callers. Validation failures report 400.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Validation(_) => Some(400),
            _ => self.reason().map(|f| f.status),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Result type alias for MMS client operations.
pub type MmsResult<T> = Result<T, MmsError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_message_mapping_is_verbatim() {
        assert_eq!(status_message(404), "Not Found");
        assert_eq!(status_message(500), "Server Error");
        assert_eq!(status_message(401), "Permission Error");
        assert_eq!(status_message(403), "Permission Error");
        assert_eq!(status_message(409), "Conflict");
        assert_eq!(status_message(400), "Failed");
        assert_eq!(status_message(502), "Failed");
        assert_eq!(status_message(0), "Failed");
    }

    #[test]
    fn test_from_http_routes_variants() {
        assert!(matches!(MmsError::from_http(404, Value::Null), MmsError::NotFound(_)));
        assert!(matches!(MmsError::from_http(409, Value::Null), MmsError::Conflict(_)));
        assert!(matches!(MmsError::from_http(500, Value::Null), MmsError::Network(_)));
        assert!(matches!(MmsError::from_http(403, Value::Null), MmsError::Network(_)));
    }

    #[test]
    fn test_reason_carries_data() {
        let err = MmsError::from_http(409, json!({"elements": [{"sysmlid": "a"}]}));
        let reason = err.reason().expect("backend errors carry a reason");
        assert_eq!(reason.status, 409);
        assert_eq!(reason.message, "Conflict");
        assert_eq!(reason.data["elements"][0]["sysmlid"], "a");
        assert!(err.is_conflict());
    }

    #[test]
    fn test_validation_error_display_and_status() {
        let err: MmsError = ValidationError::IdentityNotAllowed {
            entity: "Element".to_string(),
        }
        .into();
        assert_eq!(err.status(), Some(400));
        assert!(err.reason().is_none());
        let msg = format!("{}", err);
        assert!(msg.contains("Element create cannot have id"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "base_url",
            reason: "must not be empty".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("base_url"));
        assert!(msg.contains("must not be empty"));
    }
}
