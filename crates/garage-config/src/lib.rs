//! Configuration loading for the garage door controller
//!
//! Reads a single YAML file with support for:
//! - `!secret` tags (from secrets.yaml next to the config file)
//! - `!env_var` tags (environment variables, with an optional fallback)
//!
//! The result is a validated, immutable [`GarageConfig`].

pub mod error;
pub mod garage_config;
pub mod loader;

pub use error::{ConfigError, ConfigResult};
pub use garage_config::{
    AuthConfig, DoorsConfig, GarageConfig, GpioBackend, GpioConfig, MqttConfig, ServerConfig,
};
pub use loader::YamlLoader;
