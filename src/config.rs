//! Application configuration.
//!
//! Settings are layered with figment: compiled defaults, then a TOML file,
//! then `SESSION_WRENCH_*` environment variables (`__` separates nested keys,
//! e.g. `SESSION_WRENCH_REDIS__URL`).
//!
//! The TOML file is the one given with `--config`, else `session-wrench.toml`
//! in the working directory, else `config.toml` in the platform config
//! directory. A missing implicit file is not an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connect::RetryPolicy;
use crate::lorawan::band::{Band, BandName, Channel};
use crate::store::KeyLayout;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SESSION_WRENCH_";

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "session-wrench.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Explicit config file missing.
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    /// A layer could not be parsed or extracted.
    #[error("invalid configuration: {0}")]
    Parse(#[from] Box<figment::Error>),

    /// A value is out of range.
    #[error("invalid configuration value for '{field}': {reason}")]
    Invalid {
        /// Dotted key
        field: &'static str,
        /// What was wrong
        reason: String,
    },

    /// Rendering as TOML failed.
    #[error("cannot render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// `[general]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level used when neither `RUST_LOG` nor `-v`/`-q` are given.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

/// `[redis]` and `[dump_redis]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection URL, `redis://[:password@]host:port/db`.
    pub url: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".into(),
            pool_size: 4,
        }
    }
}

/// `[network_server.network_settings]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub rx1_delay: u8,
    pub rx1_dr_offset: u8,
    pub rx2_dr: u8,
    /// RX2 frequency in Hz, 0 for the band default.
    pub rx2_frequency: u32,
    /// Channels announced in the join-accept CFList.
    pub extra_channels: Vec<Channel>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            rx1_delay: 1,
            rx1_dr_offset: 0,
            rx2_dr: 0,
            rx2_frequency: 0,
            extra_channels: Vec::new(),
        }
    }
}

/// `[network_server]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkServerConfig {
    pub band: String,
    pub device_session_ttl_secs: u64,
    /// Channel-plan part of record keys, empty for the lower-case band name.
    pub channel_plan_id: String,
    pub device_namespace: String,
    pub devaddr_namespace: String,
    /// Network-server SQLite database.
    pub database: PathBuf,
    pub network_settings: NetworkSettings,
}

impl Default for NetworkServerConfig {
    fn default() -> Self {
        Self {
            band: "RU864".into(),
            device_session_ttl_secs: 31 * 24 * 60 * 60,
            channel_plan_id: String::new(),
            device_namespace: "lora:ns:device".into(),
            devaddr_namespace: "lora:ns:devaddr".into(),
            database: PathBuf::from("network-server.sqlite"),
            network_settings: NetworkSettings::default(),
        }
    }
}

/// `[application_server]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationServerConfig {
    pub database: PathBuf,
}

impl Default for ApplicationServerConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("application-server.sqlite"),
        }
    }
}

/// `[frame_log]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameLogConfig {
    pub database: PathBuf,
}

impl Default for FrameLogConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("frame-log.sqlite"),
        }
    }
}

/// `[connect]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 30,
            retry_delay_secs: 2,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub redis: RedisConfig,
    /// Secondary store holding an older dump, needed for dump recovery only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump_redis: Option<RedisConfig>,
    pub network_server: NetworkServerConfig,
    pub application_server: ApplicationServerConfig,
    pub frame_log: FrameLogConfig,
    pub connect: ConnectConfig,
}

impl Config {
    /// Load and validate the layered configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(path.to_path_buf()));
                }
                log::debug!("loading config from {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(path) = Self::default_paths().into_iter().find(|p| p.exists()) {
                    log::debug!("loading config from {}", path.display());
                    figment = figment.merge(Toml::file(path));
                }
            }
        }

        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Candidate implicit config files, in lookup order.
    #[must_use]
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dirs) = ProjectDirs::from("org", "session-wrench", "session-wrench") {
            paths.push(dirs.config_dir().join("config.toml"));
        }
        paths
    }

    /// Check values that would only fail later, mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.band_name()?;
        if self.network_server.device_session_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "network_server.device_session_ttl_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.redis.pool_size == 0 {
            return Err(ConfigError::Invalid {
                field: "redis.pool_size",
                reason: "must be greater than zero".into(),
            });
        }
        if self.dump_redis.as_ref().is_some_and(|d| d.pool_size == 0) {
            return Err(ConfigError::Invalid {
                field: "dump_redis.pool_size",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Configured region.
    pub fn band_name(&self) -> Result<BandName, ConfigError> {
        self.network_server
            .band
            .parse()
            .map_err(|e: crate::lorawan::band::BandError| ConfigError::Invalid {
                field: "network_server.band",
                reason: e.to_string(),
            })
    }

    /// Channel table with the configured extra channels.
    pub fn band(&self) -> Result<Band, ConfigError> {
        Ok(Band::with_extra_channels(
            self.band_name()?,
            &self.network_server.network_settings.extra_channels,
        ))
    }

    /// Store key prefixes for `band`.
    #[must_use]
    pub fn key_layout(&self, band: &Band) -> KeyLayout {
        let ns = &self.network_server;
        KeyLayout {
            device_namespace: ns.device_namespace.clone(),
            devaddr_namespace: ns.devaddr_namespace.clone(),
            plan_id: if ns.channel_plan_id.is_empty() {
                band.plan_id()
            } else {
                ns.channel_plan_id.clone()
            },
        }
    }

    /// Lifetime of saved sessions.
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.network_server.device_session_ttl_secs)
    }

    /// Startup retry settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.connect.retry_attempts,
            delay: Duration::from_secs(self.connect.retry_delay_secs),
        }
    }

    /// Effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.band_name().unwrap(), BandName::Ru864);
        assert_eq!(config.session_ttl(), Duration::from_secs(2_678_400));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_plan_id_defaults_to_band() {
        let config = Config::default();
        let band = config.band().unwrap();
        assert_eq!(config.key_layout(&band).plan_id, "ru864");

        let mut custom = Config::default();
        custom.network_server.channel_plan_id = "ru864-8ch".into();
        assert_eq!(custom.key_layout(&band).plan_id, "ru864-8ch");
    }

    #[test]
    fn test_validate_rejects_unknown_band() {
        let mut config = Config::default();
        config.network_server.band = "MARS433".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "network_server.band",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_ttl_and_pool() {
        let mut config = Config::default();
        config.network_server.device_session_ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.redis.pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/session-wrench.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_toml_render_parses_back() {
        let config = Config::default();
        let text = config.to_toml_string().unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
