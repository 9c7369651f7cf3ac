//! Configuration loading, validation, and env substitution.
//!
//! Config files: `attendo.toml`, `attendo.yaml`, or `attendo.json`
//! Searched in `./` then `~/.config/attendo/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, data_dir, discover_and_load, find_or_default_config_path, save_config},
    schema::{
        AttendoConfig, ChannelsConfig, DeliveryConfig, EvaluationDefaults, PresenceConfig,
        RetryConfig, ServerConfig, StorageConfig, TelegramAccountConfig, WidgetConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
