//! YAML loader with custom tag support
//!
//! Supported tags:
//! - `!secret key` - value of `key` in `secrets.yaml` next to the config file
//! - `!env_var VAR [default]` - Environment variable substitution

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

const SECRETS_FILE: &str = "secrets.yaml";

/// YAML loader resolving `!secret` and `!env_var` tags
#[derive(Debug, Default)]
pub struct YamlLoader {
    // Raw secrets.yaml mapping; scalars are stringified on lookup
    secrets: Mapping,
}

impl YamlLoader {
    /// Create a loader for the given config directory
    ///
    /// A missing `secrets.yaml` only matters once a `!secret` tag is used.
    pub fn new(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = config_dir.as_ref().join(SECRETS_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "No secrets file");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;
        let secrets: Option<Mapping> =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseYaml {
                path: path.clone(),
                source: e,
            })?;
        let secrets = secrets.unwrap_or_default();
        debug!(path = %path.display(), count = secrets.len(), "Loaded secrets");
        Ok(Self { secrets })
    }

    /// Load and process a YAML file
    pub fn load_file(&self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = path.as_ref();
        debug!("Loading YAML file: {:?}", path);

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.load_string(&content, path)
    }

    /// Load and process YAML from a string
    pub fn load_string(&self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        self.process_value(value)
    }

    fn process_value(&self, value: Value) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged),
            Value::Mapping(map) => {
                let mut result = serde_yaml::Mapping::new();
                for (k, v) in map {
                    result.insert(k, self.process_value(v)?);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => {
                let result: ConfigResult<Vec<Value>> =
                    seq.into_iter().map(|v| self.process_value(v)).collect();
                Ok(Value::Sequence(result?))
            }
            _ => Ok(value),
        }
    }

    fn process_tagged(&self, tagged: serde_yaml::value::TaggedValue) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!("Processing tag '{}' with value {:?}", tag, tagged.value);

        match tag.as_str() {
            "!secret" => self.process_secret(tagged.value),
            "!env_var" => self.process_env_var(tagged.value),
            _ => {
                warn!("Ignoring unknown YAML tag {}", tag);
                self.process_value(tagged.value)
            }
        }
    }

    fn process_secret(&self, value: Value) -> ConfigResult<Value> {
        let Value::String(key) = value else {
            return Err(ConfigError::InvalidValue {
                key: "!secret".to_string(),
                reason: "secret key must be a string".to_string(),
            });
        };

        let secret = match self.secrets.get(key.as_str()) {
            None => return Err(ConfigError::SecretNotFound { key }),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(_) => {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: "secrets must be strings, numbers or booleans".to_string(),
                })
            }
        };
        debug!("Substituted secret: {}", key);
        Ok(Value::String(secret))
    }

    /// `!env_var NAME` or `!env_var NAME fallback`
    fn process_env_var(&self, value: Value) -> ConfigResult<Value> {
        let Value::String(arg) = value else {
            return Err(ConfigError::InvalidValue {
                key: "!env_var".to_string(),
                reason: "environment variable name must be a string".to_string(),
            });
        };

        let (name, fallback) = match arg.split_once(char::is_whitespace) {
            Some((name, fallback)) => (name, Some(fallback.trim())),
            None => (arg.as_str(), None),
        };

        match (std::env::var(name), fallback) {
            (Ok(value), _) => {
                debug!("Substituted env var: {}", name);
                Ok(Value::String(value))
            }
            (Err(_), Some(fallback)) => Ok(Value::String(fallback.to_string())),
            (Err(_), None) => Err(ConfigError::EnvVarNotFound {
                var: name.to_string(),
            }),
        }
    }
}

/// Directory a config file lives in, `.` for a bare file name
pub(crate) fn config_dir_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn load_yaml(path: &Path) -> ConfigResult<Value> {
        YamlLoader::new(config_dir_of(path))?.load_file(path)
    }

    fn inline(content: &str) -> ConfigResult<Value> {
        YamlLoader::default().load_string(content, Path::new("inline.yaml"))
    }

    #[test]
    fn test_secret_substitution() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("secrets.yaml"),
            "mqtt_password: s3cret\nmqtt_port: 1883\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("garage.yaml"),
            "mqtt:\n  password: !secret mqtt_password\n  port: !secret mqtt_port\n",
        )
        .unwrap();

        let value = load_yaml(&dir.path().join("garage.yaml")).unwrap();
        assert_eq!(value["mqtt"]["password"].as_str(), Some("s3cret"));
        assert_eq!(value["mqtt"]["port"].as_str(), Some("1883"));
    }

    #[test]
    fn test_missing_secret() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("garage.yaml"), "key: !secret nope\n").unwrap();

        let result = load_yaml(&dir.path().join("garage.yaml"));
        assert!(matches!(result, Err(ConfigError::SecretNotFound { ref key }) if key == "nope"));
    }

    #[test]
    fn test_structured_secret_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("secrets.yaml"), "broker:\n  host: mqtt.local\n").unwrap();
        fs::write(dir.path().join("garage.yaml"), "broker: !secret broker\n").unwrap();

        let result = load_yaml(&dir.path().join("garage.yaml"));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_empty_secrets_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("secrets.yaml"), "").unwrap();
        fs::write(dir.path().join("garage.yaml"), "board_id: garage-pi\n").unwrap();

        let value = load_yaml(&dir.path().join("garage.yaml")).unwrap();
        assert_eq!(value["board_id"].as_str(), Some("garage-pi"));
    }

    #[test]
    fn test_env_var_with_fallback() {
        let value = inline("broker: !env_var GARAGE_TEST_UNSET_BROKER mqtt.local\n").unwrap();
        assert_eq!(value["broker"].as_str(), Some("mqtt.local"));
    }

    #[test]
    fn test_env_var_set() {
        std::env::set_var("GARAGE_TEST_TOPIC", "garage/left");
        let value = inline("topic: !env_var GARAGE_TEST_TOPIC\n").unwrap();
        assert_eq!(value["topic"].as_str(), Some("garage/left"));
    }

    #[test]
    fn test_env_var_missing() {
        let result = inline("topic: !env_var GARAGE_TEST_DEFINITELY_UNSET\n");
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound { .. })));
    }

    #[test]
    fn test_config_dir_of_bare_file() {
        assert_eq!(config_dir_of(Path::new("garage.yaml")), PathBuf::from("."));
        assert_eq!(
            config_dir_of(Path::new("/etc/garage/garage.yaml")),
            PathBuf::from("/etc/garage")
        );
    }
}
