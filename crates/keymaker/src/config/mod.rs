use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::keys::LanguagePolicy;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration, built once at startup and handed to each component.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub sweep: SweepConfig,
    pub keys: KeyConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let mode = StorageMode::parse(
            &env::var("APP_STORAGE_MODE").unwrap_or_else(|_| "memory".to_string()),
        )?;
        let path = env::var("APP_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("keymaker-data.json"));

        let item_timeout_secs = env::var("APP_SWEEP_ITEM_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::InvalidSweepTimeout)?;

        let language_policy = match env::var("APP_KEY_LANGUAGE_POLICY") {
            Ok(raw) => LanguagePolicy::parse(&raw)
                .ok_or(ConfigError::InvalidLanguagePolicy { value: raw })?,
            Err(_) => LanguagePolicy::Strict,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                with_target: environment == AppEnvironment::Development,
            },
            storage: StorageConfig { mode, path },
            sweep: SweepConfig {
                item_timeout: Duration::from_secs(item_timeout_secs),
            },
            keys: KeyConfig { language_policy },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub with_target: bool,
}

/// Where customer records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Memory,
    File,
}

impl StorageMode {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "file" | "json" => Ok(Self::File),
            other => Err(ConfigError::InvalidStorageMode {
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub mode: StorageMode,
    /// Snapshot file used when `mode` is [`StorageMode::File`].
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    /// Upper bound for handling a single due action.
    pub item_timeout: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            item_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KeyConfig {
    pub language_policy: LanguagePolicy,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidStorageMode { value: String },
    InvalidSweepTimeout,
    InvalidLanguagePolicy { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidStorageMode { value } => {
                write!(f, "APP_STORAGE_MODE must be 'memory' or 'file', got '{value}'")
            }
            ConfigError::InvalidSweepTimeout => {
                write!(f, "APP_SWEEP_ITEM_TIMEOUT_SECS must be a positive integer")
            }
            ConfigError::InvalidLanguagePolicy { value } => write!(
                f,
                "APP_KEY_LANGUAGE_POLICY must be 'strict' or 'lenient', got '{value}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_STORAGE_MODE",
            "APP_STORAGE_PATH",
            "APP_SWEEP_ITEM_TIMEOUT_SECS",
            "APP_KEY_LANGUAGE_POLICY",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.storage.mode, StorageMode::Memory);
        assert_eq!(config.sweep.item_timeout, Duration::from_secs(30));
        assert_eq!(config.keys.language_policy, LanguagePolicy::Strict);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 5000));
        reset_env();
    }

    #[test]
    fn file_storage_and_lenient_keys_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_STORAGE_MODE", "file");
        env::set_var("APP_STORAGE_PATH", "/tmp/keymaker.json");
        env::set_var("APP_KEY_LANGUAGE_POLICY", "lenient");
        env::set_var("APP_SWEEP_ITEM_TIMEOUT_SECS", "5");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.storage.mode, StorageMode::File);
        assert_eq!(config.storage.path, PathBuf::from("/tmp/keymaker.json"));
        assert_eq!(config.keys.language_policy, LanguagePolicy::Lenient);
        assert_eq!(config.sweep.item_timeout, Duration::from_secs(5));
        reset_env();
    }

    #[test]
    fn rejects_unknown_storage_mode() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_STORAGE_MODE", "mongodb");
        let err = AppConfig::load().expect_err("mongodb is not a supported mode");
        assert!(matches!(err, ConfigError::InvalidStorageMode { .. }));
        reset_env();
    }

    #[test]
    fn rejects_zero_sweep_timeout() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_SWEEP_ITEM_TIMEOUT_SECS", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidSweepTimeout)
        ));
        reset_env();
    }
}
