use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    database: RawDatabase,
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    logging: RawLogging,
}

#[derive(Debug, Default, Deserialize)]
struct RawDatabase {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawServer {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLogging {
    level: Option<String>,
    format: Option<LogFormat>,
}

const DEFAULT_DATABASE_URL: &str = "sqlite://budgetflow.db?mode=rwc";
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8085;

impl AppConfig {
    /// Resolution order: built-in defaults < config file < `BUDGETFLOW_*`
    /// environment variables < explicit overrides in `LoadOptions`.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let path = options
            .config_path
            .or_else(|| env::var("BUDGETFLOW_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("budgetflow.toml"));

        let raw = if path.exists() {
            let contents =
                fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
                    path: path.clone(),
                    source,
                })?;
            let contents = interpolate_env(&contents)?;
            toml::from_str::<RawConfig>(&contents)
                .map_err(|source| ConfigError::ParseFile { path: path.clone(), source })?
        } else if options.require_file {
            return Err(ConfigError::MissingConfigFile(path));
        } else {
            RawConfig::default()
        };

        let mut config = AppConfig {
            database: DatabaseConfig {
                url: raw.database.url.unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
                max_connections: raw.database.max_connections.unwrap_or(5),
                timeout_secs: raw.database.timeout_secs.unwrap_or(30),
            },
            server: ServerConfig {
                bind_address: raw
                    .server
                    .bind_address
                    .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
                port: raw.server.port.unwrap_or(DEFAULT_PORT),
                graceful_shutdown_secs: raw.server.graceful_shutdown_secs.unwrap_or(10),
            },
            logging: LoggingConfig {
                level: raw.logging.level.unwrap_or_else(|| "info".to_string()),
                format: raw.logging.format.unwrap_or(LogFormat::Compact),
            },
        };

        config.apply_env_overrides()?;
        config.apply_overrides(&options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = env::var("BUDGETFLOW_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(level) = env::var("BUDGETFLOW_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("BUDGETFLOW_LOG_FORMAT") {
            self.logging.format = match format.as_str() {
                "compact" => LogFormat::Compact,
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                other => {
                    return Err(ConfigError::InvalidEnvOverride {
                        key: "BUDGETFLOW_LOG_FORMAT".to_string(),
                        value: other.to_string(),
                    });
                }
            };
        }
        if let Ok(address) = env::var("BUDGETFLOW_BIND_ADDRESS") {
            self.server.bind_address = address;
        }
        if let Ok(port) = env::var("BUDGETFLOW_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "BUDGETFLOW_PORT".to_string(),
                value: port.clone(),
            })?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(url) = &overrides.database_url {
            self.database.url = url.clone();
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
        if let Some(address) = &overrides.bind_address {
            self.server.bind_address = address.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port must not be 0".to_string()));
        }
        match self.logging.level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(ConfigError::Validation(format!("unknown logging.level `{other}`"))),
        }
    }
}

/// Replaces `${VAR}` occurrences in the config file with the named
/// environment variable's value before TOML parsing.
fn interpolate_env(contents: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(contents.len());
    let mut rest = contents;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let var = &after[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    Ok(output)
}

pub fn default_config_path() -> &'static Path {
    Path::new("budgetflow.toml")
}
