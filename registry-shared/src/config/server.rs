use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    net::IpAddr,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::debug;

/// Environment variable selecting the base profile before any file is read.
pub const ENV_PROFILE: &str = "USER_REGISTRY_PROFILE";
/// Environment variable overriding `server.host`.
pub const ENV_HOST: &str = "USER_REGISTRY_HOST";
/// Environment variable overriding `server.port`.
pub const ENV_PORT: &str = "USER_REGISTRY_PORT";
/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "USER_REGISTRY_LOG_LEVEL";
/// Environment variable overriding `logging.format`.
pub const ENV_LOG_FORMAT: &str = "USER_REGISTRY_LOG_FORMAT";
/// Environment variable overriding `registry.id_strategy`.
pub const ENV_ID_STRATEGY: &str = "USER_REGISTRY_ID_STRATEGY";
/// Environment variable overriding `registry.unique_email_on_update`.
pub const ENV_UNIQUE_EMAIL_ON_UPDATE: &str = "USER_REGISTRY_UNIQUE_EMAIL_ON_UPDATE";

/// Every environment variable consulted by [`Config::load_config`].
pub const ENV_VARS: [&str; 7] = [
    ENV_PROFILE,
    ENV_HOST,
    ENV_PORT,
    ENV_LOG_LEVEL,
    ENV_LOG_FORMAT,
    ENV_ID_STRATEGY,
    ENV_UNIQUE_EMAIL_ON_UPDATE,
];

/// Errors raised while resolving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported configuration format `{0}`; use yaml, json, or toml")]
    UnsupportedFormat(String),
    #[error("invalid {name} value `{value}`: {reason}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid server port; must be greater than 0")]
    InvalidPort,
    #[error("invalid server host `{0}`; expected an IP address")]
    InvalidHost(String),
    #[error("invalid CORS origin `{origin}`: {reason}")]
    InvalidCorsOrigin { origin: String, reason: &'static str },
}

/// Deployment profile used to pick baseline defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    #[default]
    Dev,
    Test,
    Prod,
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(format!("unknown profile `{other}`")),
        }
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

/// How the registry assigns ids to newly created users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Strictly increasing counter; ids are never reissued.
    #[default]
    Monotonic,
    /// `record_count + 1`. Can collide with a live record after deletions,
    /// in which case the existing record is overwritten.
    LiveCount,
}

impl IdStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monotonic => "monotonic",
            Self::LiveCount => "live_count",
        }
    }
}

impl fmt::Display for IdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "monotonic" => Ok(Self::Monotonic),
            "live_count" | "live-count" => Ok(Self::LiveCount),
            other => Err(format!("unknown id strategy `{other}`")),
        }
    }
}

/// Cross-origin settings applied to every route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; empty or `["*"]` means any origin.
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_seconds: u64,
}

impl CorsConfig {
    /// `true` when every origin is allowed.
    #[must_use]
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == "*")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for origin in &self.allowed_origins {
            let invalid = |reason| ConfigError::InvalidCorsOrigin {
                origin: origin.clone(),
                reason,
            };
            if origin == "*" {
                if self.allow_credentials {
                    return Err(invalid("a wildcard origin cannot allow credentials"));
                }
                if self.allowed_origins.len() > 1 {
                    return Err(invalid("a wildcard origin cannot be mixed with explicit origins"));
                }
            } else if origin.is_empty() || !origin.chars().all(|c| c.is_ascii_graphic()) {
                return Err(invalid("must be a non-empty ASCII origin without spaces"));
            }
        }
        Ok(())
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allow_credentials: false,
            max_age_seconds: 600,
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Header carrying the per-request correlation id.
    pub request_id_header: String,
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_id_header: "x-request-id".to_string(),
            cors: CorsConfig::default(),
        }
    }
}

/// Log subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Behaviour switches for the user registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub id_strategy: IdStrategy,
    /// Reject updates that would give a user another user's email.
    pub unique_email_on_update: bool,
}

/// The main configuration structure for the user registry server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub profile: Profile,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub registry: RegistryConfig,
}

/// On-disk shape of [`Config`]. Logging fields stay optional so that the
/// profile defaults fill whatever the file leaves out.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    profile: Option<Profile>,
    server: ServerConfig,
    logging: LoggingFile,
    registry: RegistryConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoggingFile {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl ConfigFile {
    fn resolve(self, profile_override: Option<Profile>) -> Config {
        let profile = profile_override.or(self.profile).unwrap_or_default();
        let mut config = Config::default_for_profile(profile);
        config.server = self.server;
        config.registry = self.registry;
        if let Some(level) = self.logging.level {
            config.logging.level = level;
        }
        if let Some(format) = self.logging.format {
            config.logging.format = format;
        }
        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_for_profile(Profile::Dev)
    }
}

impl Config {
    /// Baseline configuration for the given profile.
    #[must_use]
    pub fn default_for_profile(profile: Profile) -> Self {
        let logging = match profile {
            Profile::Dev => LoggingConfig {
                level: "debug".to_string(),
                format: LogFormat::Text,
            },
            Profile::Test => LoggingConfig {
                level: "warn".to_string(),
                format: LogFormat::Text,
            },
            Profile::Prod => LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Json,
            },
        };

        Self {
            profile,
            server: ServerConfig::default(),
            logging,
            registry: RegistryConfig::default(),
        }
    }

    /// Loads the configuration from defaults, an optional file, the
    /// environment, and finally the command line port override.
    ///
    /// The profile comes from `USER_REGISTRY_PROFILE`, else the file's
    /// `profile`, else `dev`; its defaults fill fields the file omits.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the file cannot be read or parsed, an
    /// environment value is malformed, or the resolved config is invalid.
    pub fn load_config(
        config_path: Option<PathBuf>,
        port_override: Option<u16>,
    ) -> Result<Self, ConfigError> {
        let profile = env::var(ENV_PROFILE)
            .ok()
            .map(|value| parse_env(ENV_PROFILE, &value, |value| value.parse::<Profile>()))
            .transpose()?;

        let mut config = match config_path {
            Some(path) => Self::from_file_with_profile(&path, profile)?,
            None => Self::default_for_profile(profile.unwrap_or_default()),
        };

        config.apply_overrides_from(|name| env::var(name).ok())?;

        if let Some(port) = port_override {
            config.server.port = port;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses a configuration file; the extension selects the format.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] for unreadable files, unsupported
    /// extensions, or malformed content.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_file_with_profile(path, None)
    }

    /// Parses a configuration file, seeding omitted fields from `profile`
    /// (or the file's own `profile` when `None`).
    ///
    /// # Errors
    /// Same as [`Config::from_file`].
    pub fn from_file_with_profile(
        path: &Path,
        profile: Option<Profile>,
    ) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let file: ConfigFile = match extension.as_str() {
            "yaml" | "yml" => serde_yml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        let config = file.resolve(profile);
        debug!(path = %path.display(), profile = ?config.profile, "loaded configuration file");
        Ok(config)
    }

    /// Applies `USER_REGISTRY_*` overrides using `lookup` to read variables.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidEnv`] when a value cannot be parsed.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.server.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = parse_env(ENV_PORT, &port, |value| {
                value
                    .parse::<u16>()
                    .map_err(|_| "must be a number between 1 and 65535".to_string())
            })?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = parse_env(ENV_LOG_FORMAT, &format, |value| {
                value.parse::<LogFormat>()
            })?;
        }
        if let Some(strategy) = lookup(ENV_ID_STRATEGY) {
            self.registry.id_strategy = parse_env(ENV_ID_STRATEGY, &strategy, |value| {
                value.parse::<IdStrategy>()
            })?;
        }
        if let Some(flag) = lookup(ENV_UNIQUE_EMAIL_ON_UPDATE) {
            self.registry.unique_email_on_update =
                parse_env(ENV_UNIQUE_EMAIL_ON_UPDATE, &flag, parse_bool)?;
        }
        Ok(())
    }

    /// Checks the resolved configuration for values the server cannot use.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidPort`], [`ConfigError::InvalidHost`] or
    /// [`ConfigError::InvalidCorsOrigin`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.server.host.parse::<IpAddr>().is_err() {
            return Err(ConfigError::InvalidHost(self.server.host.clone()));
        }
        self.server.cors.validate()
    }
}

fn parse_env<T, P>(name: &'static str, value: &str, parse: P) -> Result<T, ConfigError>
where
    P: Fn(&str) -> Result<T, String>,
{
    parse(value).map_err(|reason| ConfigError::InvalidEnv {
        name,
        value: value.to_string(),
        reason,
    })
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got `{other}`")),
    }
}
