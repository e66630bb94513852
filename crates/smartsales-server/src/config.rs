//! Configuration for the SmartSales pipeline and reporting server
//!
//! Loads configuration from:
//! 1. config.yaml - paths, server address, logging
//! 2. .env file - loaded into the environment by `main`
//!
//! Environment variables always override config.yaml values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidEnvVar { name: String, value: String },
}

/// Location of the warehouse file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub path: PathBuf,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/dw/smart_sales.duckdb"),
        }
    }
}

/// Cleaned CSV inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Directory the file names below are resolved against
    pub data_dir: PathBuf,
    pub customers: String,
    pub products: String,
    pub sales: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/prepared"),
            customers: "customers_data_prepared.csv".to_string(),
            products: "products_data_prepared.csv".to_string(),
            sales: "sales_data_prepared.csv".to_string(),
        }
    }
}

impl SourcesConfig {
    pub fn customers_path(&self) -> PathBuf {
        self.data_dir.join(&self.customers)
    }

    pub fn products_path(&self) -> PathBuf {
        self.data_dir.join(&self.products)
    }

    pub fn sales_path(&self) -> PathBuf {
        self.data_dir.join(&self.sales)
    }
}

/// Where cube CSVs are written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub cube_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            cube_dir: PathBuf::from("data/olap_cubing_outputs"),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub warehouse: WarehouseConfig,
    pub sources: SourcesConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from the defaults.
    /// Environment overrides apply either way.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            return Self::load(path);
        }
        tracing::debug!(path = %path.as_ref().display(), "No config file, using defaults");
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = std::env::var("SMARTSALES_DB_PATH") {
            self.warehouse.path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("SMARTSALES_DATA_DIR") {
            self.sources.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("SMARTSALES_OUTPUT_DIR") {
            self.output.cube_dir = PathBuf::from(dir);
        }

        if let Ok(host) = std::env::var("SMARTSALES_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SMARTSALES_SERVER_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnvVar {
                name: "SMARTSALES_SERVER_PORT".to_string(),
                value: port.clone(),
            })?;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.warehouse.path, PathBuf::from("data/dw/smart_sales.duckdb"));
        assert_eq!(
            config.sources.sales_path(),
            PathBuf::from("data/prepared/sales_data_prepared.csv")
        );
        assert_eq!(config.output.cube_dir, PathBuf::from("data/olap_cubing_outputs"));
        assert_eq!(config.server.addr(), "127.0.0.1:8080");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.logging.output, "stdout");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            r#"
sources:
  data_dir: "/srv/prepared"
server:
  port: 9000
"#,
        )
        .unwrap();
        assert_eq!(
            config.sources.customers_path(),
            PathBuf::from("/srv/prepared/customers_data_prepared.csv")
        );
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.output.cube_dir, PathBuf::from("data/olap_cubing_outputs"));
    }

    // Environment overrides are exercised in one test so parallel tests do
    // not observe each other's variables.
    #[test]
    fn test_env_var_override() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(
            &config_path,
            r#"
warehouse:
  path: "data/dw/smart_sales.duckdb"
server:
  host: "127.0.0.1"
  port: 8080
logging:
  level: "info"
  format: "pretty"
  output: "stdout"
  directory: "./logs"
"#,
        )
        .unwrap();

        std::env::set_var("SMARTSALES_SERVER_PORT", "9090");
        std::env::set_var("SMARTSALES_DB_PATH", "/tmp/other.duckdb");
        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.warehouse.path, PathBuf::from("/tmp/other.duckdb"));

        std::env::set_var("SMARTSALES_SERVER_PORT", "not-a-port");
        assert!(matches!(
            Config::load(&config_path),
            Err(ConfigError::InvalidEnvVar { ref name, .. }) if name == "SMARTSALES_SERVER_PORT"
        ));

        std::env::remove_var("SMARTSALES_SERVER_PORT");
        std::env::remove_var("SMARTSALES_DB_PATH");

        let missing = Config::load_or_default(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(missing.server.port, 8080);
    }
}
