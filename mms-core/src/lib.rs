//! MMS Core - Entity Types, Keys and Errors
//!
//! Pure data structures and pure functions shared by the cache and the
//! client services. Nothing in this crate performs I/O except config loading.

pub mod config;
pub mod element;
pub mod error;
pub mod key;
pub mod transport;
pub mod version;

pub use config::{AuthConfig, ClientConfig, CONFIG_ENV_VAR};
pub use element::{
    clean_element, element_id, has_field, is_partially_hydrated, strip_volatile,
    SpecializationKind, CONTAINS_FIELD, ID_FIELD, NON_EDIT_KEYS, OWNER_FIELD, READ_FIELD,
    SPECIALIZATION_FIELD, VIEW2VIEW_FIELD, VOLATILE_FIELDS,
};
pub use error::{status_message, ConfigError, HttpFailure, MmsError, MmsResult, ValidationError};
pub use key::{
    element_key, normalize, CacheKey, EntityKind, Normalized, RequestOptions, EDIT_SEGMENT,
    KEY_DELIMITER,
};
pub use transport::{envelope_first, envelope_list, Transport, TransportError};
pub use version::{is_timestamp, Version, LATEST, MASTER_WORKSPACE};
