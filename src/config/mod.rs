//! The portal document model and its cache-backed loader, plus structural
//! validation for loaded documents.

pub mod service;
pub mod settings;
pub mod validation;

pub use service::{ConfigService, ConfigSource, LoadedConfig};
pub use settings::{
    new_config_handle, swap_config, with_config, CategoryConfig, ConfigHandle, FeatureFlags,
    LinkEntry, PortalConfig, RuntimeOptions,
};
pub use validation::{validate, ValidationReport};
