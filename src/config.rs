//! Configuration module for the echo server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Default kernel socket buffer size (4MB).
const DEFAULT_SOCKET_BUFFER: usize = 4 * 1024 * 1024;

/// Runtime backend for the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    /// io_uring completion-based runtime (Linux only, default)
    #[default]
    Uring,
    /// mio readiness runtime (epoll on Linux, kqueue on macOS)
    Mio,
}

/// Command-line arguments for the echo server
#[derive(Parser, Debug)]
#[command(name = "udp-echod")]
#[command(version = "0.1.0")]
#[command(about = "A scalable shared-nothing UDP echo server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// UDP port to listen on (1-65535)
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Number of cores to use (0 = all available)
    #[arg(short = 'c', long)]
    pub cores: Option<usize>,

    /// Kernel receive/send buffer size in bytes
    #[arg(short = 'b', long)]
    pub recvbuf: Option<usize>,

    /// Runtime backend (uring or mio)
    #[arg(long, value_enum)]
    pub runtime: Option<RuntimeType>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize, Default)]
pub struct ServerConfig {
    /// UDP port to listen on
    pub port: Option<u16>,
    /// Number of worker cores (0 = all available)
    pub cores: Option<usize>,
    /// Kernel socket buffer size in bytes
    pub recvbuf: Option<usize>,
    /// Runtime backend
    pub runtime: Option<RuntimeType>,
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

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cores: usize,
    pub recvbuf: usize,
    pub runtime: RuntimeType,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = match CliArgs::try_parse() {
            Ok(cli) => cli,
            Err(e) => {
                // Help and version print to stdout and exit 0; anything
                // else is a configuration error and exits 1.
                use clap::error::ErrorKind;
                let _ = e.print();
                match e.kind() {
                    ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => std::process::exit(0),
                    _ => std::process::exit(1),
                }
            }
        };

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents).map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence).
    fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let port = cli
            .port
            .or(toml_config.server.port)
            .ok_or(ConfigError::MissingPort)?;
        if port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        Ok(Config {
            port,
            cores: cli.cores.or(toml_config.server.cores).unwrap_or(0),
            recvbuf: cli
                .recvbuf
                .or(toml_config.server.recvbuf)
                .unwrap_or(DEFAULT_SOCKET_BUFFER),
            runtime: cli
                .runtime
                .or(toml_config.server.runtime)
                .unwrap_or_default(),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    MissingPort,
    InvalidPort,
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
            ConfigError::MissingPort => {
                write!(f, "Port is required (--port or [server] port in config file)")
            }
            ConfigError::InvalidPort => write!(f, "Invalid port: expected 1-65535"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_port_is_an_error() {
        let cli = CliArgs::try_parse_from(["udp-echod"]).unwrap();
        let result = Config::resolve(cli, TomlConfig::default());
        assert!(matches!(result, Err(ConfigError::MissingPort)));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = CliArgs::try_parse_from(["udp-echod", "--port", "9000"]).unwrap();
        let config = Config::resolve(cli, TomlConfig::default()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.cores, 0);
        assert_eq!(config.recvbuf, 4 * 1024 * 1024);
        assert_eq!(config.runtime, RuntimeType::Uring);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_short_flags() {
        let cli = CliArgs::try_parse_from(["udp-echod", "-p", "9000", "-c", "4", "-b", "1048576"])
            .unwrap();
        let config = Config::resolve(cli, TomlConfig::default()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.cores, 4);
        assert_eq!(config.recvbuf, 1048576);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            port = 9000
            cores = 4
            recvbuf = 8388608
            runtime = "mio"

            [logging]
            level = "debug"
        "#;

        let toml_config: TomlConfig = toml::from_str(toml_str).unwrap();
        let cli = CliArgs::try_parse_from(["udp-echod"]).unwrap();
        let config = Config::resolve(cli, toml_config).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.cores, 4);
        assert_eq!(config.recvbuf, 8388608);
        assert_eq!(config.runtime, RuntimeType::Mio);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_cli_takes_precedence_over_toml() {
        let toml_str = r#"
            [server]
            port = 9000
            cores = 2
        "#;

        let toml_config: TomlConfig = toml::from_str(toml_str).unwrap();
        let cli = CliArgs::try_parse_from(["udp-echod", "--port", "9001"]).unwrap();
        let config = Config::resolve(cli, toml_config).unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.cores, 2);
    }

    #[test]
    fn test_cli_log_level_overrides_toml() {
        let toml_str = r#"
            [logging]
            level = "debug"
        "#;

        let toml_config: TomlConfig = toml::from_str(toml_str).unwrap();
        let cli =
            CliArgs::try_parse_from(["udp-echod", "--port", "9000", "--log-level", "info"])
                .unwrap();
        let config = Config::resolve(cli, toml_config).unwrap();
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_port_zero_rejected() {
        let cli = CliArgs::try_parse_from(["udp-echod", "--port", "0"]).unwrap();
        let result = Config::resolve(cli, TomlConfig::default());
        assert!(matches!(result, Err(ConfigError::InvalidPort)));
    }
}
