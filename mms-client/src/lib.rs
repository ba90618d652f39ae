//! MMS Client - Cached access to the model-management backend
//!
//! A [`Session`] wires one [`CacheStore`](mms_storage::CacheStore) to the
//! element, view, config, site, workspace and image services. Every read returns a shared
//! [`EntryHandle`](mms_storage::EntryHandle); later writes to the same key
//! are visible through handles already handed out.

pub mod cli;
pub mod config_service;
pub mod conflict;
pub mod context;
pub mod element_service;
pub mod image_service;
pub mod rest;
pub mod session;
pub mod site_service;
pub mod telemetry;
pub mod url;
pub mod view_service;
pub mod workspace_service;

pub use config_service::ConfigService;
pub use conflict::{ConflictResolver, Resolution};
pub use context::ServiceContext;
pub use element_service::ElementService;
pub use image_service::ImageService;
pub use rest::RestTransport;
pub use session::Session;
pub use site_service::SiteService;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig, TelemetryError};
pub use url::{add_version, UrlBuilder};
pub use view_service::ViewService;
pub use workspace_service::WorkspaceService;
