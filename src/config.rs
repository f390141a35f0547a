//! Configuration for the shravan subscriber
//!
//! Loads configuration from a TOML file: trust anchor location, server
//! endpoint, log level and CSV output path. Host and port can be overridden
//! on the command line (see `main.rs`).

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub cert: CertConfig,
    pub tcp: TcpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Trust anchor used to validate the server certificate chain
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CertConfig {
    /// Path to the CA certificate in PEM format
    pub path: String,
}

/// Server endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TcpConfig {
    /// Server hostname or IP address
    pub host: String,
    /// Server TCP port
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error); the RUST_LOG
    /// environment variable still takes precedence
    pub level: String,
}

/// Recorded-series output
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Destination file for the logged signal series
    pub csv_path: String,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Default configuration for the demo simulator deployment
    pub fn demo_defaults() -> Self {
        Self {
            cert: CertConfig {
                path: "certs/simulator-ca.pem".to_string(),
            },
            tcp: TcpConfig {
                host: "demo-amp.mocopla.link".to_string(),
                port: 55003,
            },
            logging: LoggingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::demo_defaults()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: "logged_signals.csv".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::demo_defaults();
        assert_eq!(config.cert.path, "certs/simulator-ca.pem");
        assert_eq!(config.tcp.host, "demo-amp.mocopla.link");
        assert_eq!(config.tcp.port, 55003);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.output.csv_path, "logged_signals.csv");
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[cert]
path = "/etc/shravan/ca.pem"

[tcp]
host = "10.0.0.5"
port = 55100

[logging]
level = "debug"

[output]
csv_path = "/tmp/signals.csv"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.cert.path, "/etc/shravan/ca.pem");
        assert_eq!(config.tcp.host, "10.0.0.5");
        assert_eq!(config.tcp.port, 55100);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.output.csv_path, "/tmp/signals.csv");
    }

    #[test]
    fn test_optional_sections_fall_back_to_defaults() {
        let toml_content = r#"
[cert]
path = "ca.pem"

[tcp]
host = "localhost"
port = 55003
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.output.csv_path, "logged_signals.csv");
    }
}
