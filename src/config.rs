//! Configuration module for the line-reactor server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Readiness facility used by the reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PollerType {
    /// mio (epoll on Linux, kqueue on macOS)
    Mio,
    /// POSIX select(2)
    Select,
}

/// Command-line arguments for the echo server
#[derive(Parser, Debug)]
#[command(name = "line-reactor")]
#[command(author = "line-reactor authors")]
#[command(version = "0.1.0")]
#[command(about = "A single-threaded line echo server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:7878)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Maximum number of concurrent connections
    #[arg(short = 'n', long)]
    pub max_connections: Option<usize>,

    /// Maximum record length in bytes, newline included
    #[arg(long)]
    pub max_line: Option<usize>,

    /// Per-connection read buffer size in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Readiness poller backend
    #[arg(long, value_enum)]
    pub poller: Option<PollerType>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Readiness poller backend
    #[serde(default = "default_poller")]
    pub poller: PollerType,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backlog: default_backlog(),
            poller: default_poller(),
        }
    }
}

/// Connection table and buffering configuration
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    /// Capacity of the connection pool
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum record length, newline included
    #[serde(default = "default_max_line")]
    pub max_line: usize,
    /// Per-connection read buffer size
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_line: default_max_line(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:7878".to_string()
}

fn default_backlog() -> i32 {
    1024
}

fn default_poller() -> PollerType {
    PollerType::Mio
}

fn default_max_connections() -> usize {
    1024
}

fn default_max_line() -> usize {
    8192
}

fn default_buffer_size() -> usize {
    8192
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub backlog: i32,
    pub poller: PollerType,
    pub max_connections: usize,
    pub max_line: usize,
    pub buffer_size: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        TomlConfig::default().into()
    }
}

impl From<TomlConfig> for Config {
    fn from(toml_config: TomlConfig) -> Self {
        Config {
            listen: toml_config.server.listen,
            backlog: toml_config.server.backlog,
            poller: toml_config.server.poller,
            max_connections: toml_config.connection.max_connections,
            max_line: toml_config.connection.max_line,
            buffer_size: toml_config.connection.buffer_size,
            log_level: toml_config.logging.level,
        }
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve already-parsed CLI arguments against the optional TOML file.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let file = Config::from(toml_config);

        // Merge CLI args with TOML config (CLI takes precedence)
        let config = Config {
            listen: cli.listen.unwrap_or(file.listen),
            backlog: file.backlog,
            poller: cli.poller.unwrap_or(file.poller),
            max_connections: cli.max_connections.unwrap_or(file.max_connections),
            max_line: cli.max_line.unwrap_or(file.max_line),
            buffer_size: cli.buffer_size.unwrap_or(file.buffer_size),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                file.log_level
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the reactor cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be at least 1".into()));
        }
        if self.max_line == 0 {
            return Err(ConfigError::Invalid("max_line must be at least 1".into()));
        }
        if self.buffer_size < self.max_line {
            return Err(ConfigError::Invalid(format!(
                "buffer_size ({}) must be at least max_line ({})",
                self.buffer_size, self.max_line
            )));
        }
        if self.backlog <= 0 {
            return Err(ConfigError::Invalid("backlog must be positive".into()));
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
