use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_PATH: &str = "./procdump.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Influx,
    Mqtt,
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub sink: SinkKind,
    pub output_dir: PathBuf,
    pub sample_window_ms: u64,
    pub credentials_path: PathBuf,
    pub http_timeout_secs: u64,
    pub mqtt: MqttConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sink: SinkKind::Influx,
            output_dir: PathBuf::from("."),
            sample_window_ms: default_sample_window_ms(),
            credentials_path: PathBuf::from("./influx_credentials.txt"),
            http_timeout_secs: default_http_timeout_secs(),
            mqtt: MqttConfig::default(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "192.168.188.74".to_string(),
            port: 1883,
            topic: "system/processes".to_string(),
            client_id: "procdump".to_string(),
            keep_alive_secs: 60,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = match fs::read_to_string(path_ref) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path_display,
                    source,
                })
            }
        };

        let cfg = Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=5000).contains(&self.sample_window_ms) {
            return Err(ConfigError::Validation(
                "sample_window_ms must be within 1..=5000".to_string(),
            ));
        }
        if self.http_timeout_secs < 1 {
            return Err(ConfigError::Validation(
                "http_timeout_secs must be >= 1".to_string(),
            ));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "output_dir must not be empty".to_string(),
            ));
        }

        match self.sink {
            SinkKind::Influx => {
                if self.credentials_path.as_os_str().is_empty() {
                    return Err(ConfigError::Validation(
                        "credentials_path is required for the influx sink".to_string(),
                    ));
                }
            }
            SinkKind::Mqtt => validate_mqtt(&self.mqtt)?,
            SinkKind::None => {}
        }

        Ok(())
    }

    // Used when the override file is unusable: archive locally, publish nowhere.
    pub fn archive_only() -> Self {
        Self {
            sink: SinkKind::None,
            ..Self::default()
        }
    }

    pub fn sample_window(&self) -> Duration {
        Duration::from_millis(self.sample_window_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn validate_mqtt(cfg: &MqttConfig) -> Result<(), ConfigError> {
    if cfg.host.trim().is_empty() {
        return Err(ConfigError::Validation(
            "mqtt.host must not be empty".to_string(),
        ));
    }
    if cfg.port == 0 {
        return Err(ConfigError::Validation(
            "mqtt.port must be within 1..65535".to_string(),
        ));
    }
    if cfg.topic.trim().is_empty() || cfg.topic.contains(['+', '#']) {
        return Err(ConfigError::Validation(
            "mqtt.topic must be a non-empty topic without wildcards".to_string(),
        ));
    }
    if cfg.keep_alive_secs < 5 {
        return Err(ConfigError::Validation(
            "mqtt.keep_alive_secs must be >= 5".to_string(),
        ));
    }
    if cfg.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "mqtt.timeout_secs must be >= 1".to_string(),
        ));
    }
    Ok(())
}

const fn default_sample_window_ms() -> u64 {
    100
}

const fn default_http_timeout_secs() -> u64 {
    10
}
