//! Configuration management for the rsdispatch server.
//!
//! Sources, lowest precedence first:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables prefixed with `RSDISPATCH_`, `__` separating
//!    nested keys (`RSDISPATCH_SERVER__PORT=9090` overrides `server.port`)
//!
//! # Example
//!
//! ```ignore
//! use rsdispatch_server::config::ServerConfig;
//!
//! let config = ServerConfig::load("rsdispatch.yaml")?;
//! let config = ServerConfig::from_env()?;
//! ```

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub discovery: DiscoverySettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Server network settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Session store settings.
///
/// ```yaml
/// session:
///   backend: tiered
///   cache_capacity: 100000
///   test_session_fallback: false
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SessionSettings {
    /// Store backend: "memory", "cache" or "tiered".
    #[serde(default = "default_session_backend")]
    pub backend: String,

    /// Upper bound on cached sessions for the "cache" and "tiered" backends.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Substitute the built-in test session when no valid session is
    /// presented. Development only.
    #[serde(default)]
    pub test_session_fallback: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            backend: default_session_backend(),
            cache_capacity: default_cache_capacity(),
            test_session_fallback: false,
        }
    }
}

fn default_session_backend() -> String {
    "memory".to_string()
}

fn default_cache_capacity() -> u64 {
    100_000
}

/// Dispatcher settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DispatchSettings {
    /// Locale used when a request names none.
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// Put exception text into `platform.fault` references.
    #[serde(default)]
    pub detailed_errors: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_locale: default_locale(),
            detailed_errors: false,
        }
    }
}

fn default_locale() -> String {
    "en-nz".to_string()
}

/// One entry of a static routing table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StaticRoute {
    pub resource: String,
    #[serde(default = "default_route_version")]
    pub version: u32,
    /// Base URL (http mode) or queue name (queue mode).
    pub location: String,
}

fn default_route_version() -> u32 {
    1
}

/// Remote peer discovery settings.
///
/// ```yaml
/// discovery:
///   mode: http
///   routes:
///     - resource: Gadget
///       version: 1
///       location: http://gadgets.internal:8080
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DiscoverySettings {
    /// "http" (self-registering discovery table) or "queue" (static routing
    /// table only).
    #[serde(default = "default_discovery_mode")]
    pub mode: String,

    #[serde(default)]
    pub routes: Vec<StaticRoute>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            mode: default_discovery_mode(),
            routes: Vec::new(),
        }
    }
}

fn default_discovery_mode() -> String {
    "http".to_string()
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,

    /// Emit span enter/exit events
    #[serde(default)]
    pub spans: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            spans: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Loads a YAML file with environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Loads defaults with environment overrides.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than 0".to_string()));
        }

        let valid_backends = ["memory", "cache", "tiered"];
        if !valid_backends.contains(&self.session.backend.as_str()) {
            return Err(invalid(format!(
                "session.backend must be one of: {:?}, got: {}",
                valid_backends, self.session.backend
            )));
        }

        if self.session.backend != "memory" && self.session.cache_capacity == 0 {
            return Err(invalid(format!(
                "session.cache_capacity must be greater than 0 for backend '{}'",
                self.session.backend
            )));
        }

        if self.dispatch.default_locale.trim().is_empty() {
            return Err(invalid(
                "dispatch.default_locale cannot be empty".to_string(),
            ));
        }

        let valid_modes = ["http", "queue"];
        if !valid_modes.contains(&self.discovery.mode.as_str()) {
            return Err(invalid(format!(
                "discovery.mode must be one of: {:?}, got: {}",
                valid_modes, self.discovery.mode
            )));
        }

        if let Some(route) = self
            .discovery
            .routes
            .iter()
            .find(|r| r.resource.trim().is_empty() || r.location.trim().is_empty() || r.version == 0)
        {
            return Err(invalid(format!(
                "discovery.routes entry {route:?} needs a resource, a version >= 1 and a location"
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.level must be one of: {:?}, got: {}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix("RSDISPATCH")
        .prefix_separator("_")
        .separator("__")
}

fn invalid(message: String) -> ConfigLoadError {
    ConfigLoadError::Invalid { message }
}
