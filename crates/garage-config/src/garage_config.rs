//! Typed garage controller configuration

use crate::error::{ConfigError, ConfigResult};
use crate::loader::{config_dir_of, YamlLoader};
use garage_core::{DoorId, DoorPins, PinId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Complete configuration of the controller
///
/// Read once at startup and handed to components by value or `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GarageConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Overrides the identifier reported by the hardware backend
    #[serde(default)]
    pub board_id: Option<String>,

    #[serde(default)]
    pub gpio: GpioConfig,

    /// Actuator hold time in milliseconds
    #[serde(default = "default_pin_move_delay")]
    pub pin_move_delay: u64,

    pub doors: DoorsConfig,

    #[serde(default)]
    pub mqtt: Option<MqttConfig>,

    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Expose the notification test route
    #[serde(default)]
    pub debug_routes: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            debug_routes: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpioBackend {
    #[default]
    Simulated,
    Rpi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpioConfig {
    #[serde(default)]
    pub backend: GpioBackend,

    /// Capacity of the edge channel between backend and dispatcher
    #[serde(default = "default_edge_capacity")]
    pub edge_capacity: usize,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            backend: GpioBackend::default(),
            edge_capacity: default_edge_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorsConfig {
    pub left: DoorPins,
    pub right: DoorPins,
}

impl DoorsConfig {
    pub fn pins(&self, door: DoorId) -> DoorPins {
        match door {
            DoorId::Left => self.left,
            DoorId::Right => self.right,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    pub left_topic: String,
    pub right_topic: String,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl MqttConfig {
    pub fn topic(&self, door: DoorId) -> &str {
        match door {
            DoorId::Left => &self.left_topic,
            DoorId::Right => &self.right_topic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,

    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// PEM public key for RS*/PS*/ES* algorithms, relative to the config file
    #[serde(default)]
    pub public_key: Option<PathBuf>,

    /// Shared secret for HS* algorithms
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default = "default_claim")]
    pub claim: String,

    #[serde(default)]
    pub ignore_expiration: bool,

    #[serde(default)]
    pub ignore_not_before: bool,
}

impl AuthConfig {
    /// HS256/HS384/HS512
    pub fn uses_shared_secret(&self) -> bool {
        self.algorithm.to_ascii_uppercase().starts_with("HS")
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_pin_move_delay() -> u64 {
    500
}

fn default_edge_capacity() -> usize {
    256
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "garage-door".to_string()
}

fn default_keep_alive() -> u64 {
    30
}

fn default_algorithm() -> String {
    "RS256".to_string()
}

fn default_claim() -> String {
    "garage".to_string()
}

impl GarageConfig {
    /// Load, resolve and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let config_dir = config_dir_of(path);
        let loader = YamlLoader::new(&config_dir)?;
        let value = loader.load_file(path)?;

        let mut config = Self::from_value(value)?;
        if let Some(key) = config.auth.public_key.take() {
            config.auth.public_key = Some(if key.is_relative() {
                config_dir.join(key)
            } else {
                key
            });
        }

        config.validate()?;
        info!(
            path = %path.display(),
            backend = ?config.gpio.backend,
            mqtt = config.mqtt.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse from already tag-resolved YAML; does not validate
    pub fn from_value(value: serde_yaml::Value) -> ConfigResult<Self> {
        serde_yaml::from_value(value).map_err(|e| ConfigError::InvalidValue {
            key: "garage".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn pin_move_delay(&self) -> Duration {
        Duration::from_millis(self.pin_move_delay)
    }

    pub fn door(&self, door: DoorId) -> DoorPins {
        self.doors.pins(door)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for door in DoorId::ALL {
            let pins = self.door(door);
            for (name, pin) in [
                ("actuator", pins.actuator),
                ("open_sensor", pins.open_sensor),
                ("closed_sensor", pins.closed_sensor),
            ] {
                if !seen.insert(pin) {
                    return Err(duplicate_pin(door, name, pin));
                }
            }
        }

        if self.pin_move_delay == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pin_move_delay".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.gpio.edge_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "gpio.edge_capacity".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if let Some(mqtt) = &self.mqtt {
            if mqtt.left_topic.is_empty() || mqtt.right_topic.is_empty() {
                return Err(ConfigError::ValidationFailed {
                    message: "mqtt topics must not be empty".to_string(),
                });
            }
            if mqtt.left_topic == mqtt.right_topic {
                return Err(ConfigError::ValidationFailed {
                    message: format!("mqtt topics must differ, both are '{}'", mqtt.left_topic),
                });
            }
        }

        if self.auth.uses_shared_secret() {
            if self.auth.secret.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::ValidationFailed {
                    message: format!("auth.secret is required for {}", self.auth.algorithm),
                });
            }
        } else if self.auth.public_key.is_none() {
            return Err(ConfigError::ValidationFailed {
                message: format!("auth.public_key is required for {}", self.auth.algorithm),
            });
        }

        Ok(())
    }

    /// Example configuration printed when loading fails
    pub fn example() -> &'static str {
        EXAMPLE_CONFIG
    }
}

fn duplicate_pin(door: DoorId, name: &str, pin: PinId) -> ConfigError {
    ConfigError::ValidationFailed {
        message: format!("pin {} ({} of {} door) is used more than once", pin, name, door),
    }
}

const EXAMPLE_CONFIG: &str = r#"server:
  bind: "0.0.0.0:8080"
  debug_routes: false
board_id: "garage-pi"
gpio:
  backend: simulated
pin_move_delay: 500
doors:
  left:  { actuator: 17, open_sensor: 22, closed_sensor: 27 }
  right: { actuator: 18, open_sensor: 23, closed_sensor: 24 }
mqtt:
  broker: "localhost"
  port: 1883
  client_id: "garage-door"
  user: "garage"
  password: !secret mqtt_password
  left_topic: "garage/left"
  right_topic: "garage/right"
auth:
  issuer: "authorize.example.com"
  audience: "api.example.com"
  algorithm: RS256
  public_key: "server.pem"
  claim: "garage"
"#;
