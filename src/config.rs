//! Service configuration.
//!
//! Settings are layered, lowest precedence first:
//!
//! 1. Built-in defaults (see [`crate::constants`])
//! 2. An optional TOML file
//! 3. Environment variables (`UPLOAD_PATH`, `MAX_UPLOAD_SIZE`,
//!    `DELETION_DELAY`, `HOST`, `PORT`, `SWEEP_ORPHANS`, `LOG_FORMAT`)
//! 4. Command-line flags
//!
//! Environment values that do not parse are ignored and the lower layer
//! wins, so a typo in `MAX_UPLOAD_SIZE` falls back to the default instead of
//! refusing to start.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::constants;
use crate::relay::RelayConfig;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Effective service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding uploads.
    pub upload_path: PathBuf,
    /// Upload ceiling in bytes.
    pub max_upload_size: u64,
    /// Minutes before an undownloaded upload is deleted.
    pub deletion_delay: u64,
    pub host: String,
    pub port: u16,
    /// Delete leftover files from a previous run at startup.
    pub sweep_orphans: bool,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_path: PathBuf::from(constants::DEFAULT_UPLOAD_PATH),
            max_upload_size: constants::DEFAULT_MAX_UPLOAD_SIZE,
            deletion_delay: constants::DEFAULT_DELETION_DELAY_MINUTES,
            host: constants::DEFAULT_HOST.to_string(),
            port: constants::DEFAULT_PORT,
            sweep_orphans: false,
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load configuration from the specified TOML file. Missing keys keep
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - A key is unknown or has the wrong type
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Applies environment variables from the process environment.
    ///
    /// Returns the variables that were set but ignored because they did not
    /// parse. Logging is usually not up yet, so the caller reports them.
    pub fn apply_env(&mut self) -> Vec<IgnoredEnv> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Applies environment variables read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Vec<IgnoredEnv>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ignored = Vec::new();
        if let Some(path) = lookup("UPLOAD_PATH").filter(|p| !p.is_empty()) {
            self.upload_path = PathBuf::from(path);
        }
        override_parsed(&lookup, "MAX_UPLOAD_SIZE", &mut self.max_upload_size, &mut ignored);
        override_parsed(&lookup, "DELETION_DELAY", &mut self.deletion_delay, &mut ignored);
        if let Some(host) = lookup("HOST").filter(|h| !h.is_empty()) {
            self.host = host;
        }
        override_parsed(&lookup, "PORT", &mut self.port, &mut ignored);
        if let Some(raw) = lookup("SWEEP_ORPHANS") {
            match parse_flag(&raw) {
                Some(flag) => self.sweep_orphans = flag,
                None => ignored.push(IgnoredEnv {
                    key: "SWEEP_ORPHANS",
                    value: raw,
                }),
            }
        }
        override_parsed(&lookup, "LOG_FORMAT", &mut self.log_format, &mut ignored);
        ignored
    }

    /// Time-to-live for each upload.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.deletion_delay.saturating_mul(60))
    }

    /// Relay limits derived from this configuration.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            max_upload_size: self.max_upload_size,
            ttl: self.ttl(),
            ..RelayConfig::default()
        }
    }

    /// Socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not an IP address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("Invalid listen host: {}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Validate the effective configuration.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails with one or more errors:
    /// - Zero upload ceiling or port
    /// - Host that is not an IP address
    /// - Upload path that exists but is not a directory
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.max_upload_size == 0 {
            errors.push("max_upload_size must be greater than 0".to_string());
        }
        if self.port == 0 {
            errors.push("port must be greater than 0".to_string());
        }
        if self.host.parse::<IpAddr>().is_err() {
            errors.push(format!("host must be an IP address (got: '{}')", self.host));
        }
        if self.upload_path.exists() && !self.upload_path.is_dir() {
            errors.push(format!(
                "upload_path is not a directory: {}",
                self.upload_path.display()
            ));
        }

        if self.deletion_delay == 0 {
            warnings.push(
                "deletion_delay is 0: uploads expire almost immediately after they are stored"
                    .to_string(),
            );
        }
        if self.upload_path.as_os_str().is_empty() {
            warnings.push("upload_path is empty: using the working directory".to_string());
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}

/// An environment variable that was set but could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredEnv {
    pub key: &'static str,
    pub value: String,
}

fn override_parsed<T, F>(lookup: &F, key: &'static str, slot: &mut T, ignored: &mut Vec<IgnoredEnv>)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => ignored.push(IgnoredEnv { key, value: raw }),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.upload_path, PathBuf::from("./uploads"));
        assert_eq!(config.max_upload_size, 10 * 1024 * 1024);
        assert_eq!(config.deletion_delay, 5);
        assert_eq!(config.port, 9090);
        assert_eq!(config.ttl(), Duration::from_secs(300));
        assert!(!config.sweep_orphans);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(!config.validate().unwrap().has_warnings());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        let ignored = config.apply_env_with(env(&[
            ("UPLOAD_PATH", "/tmp/share"),
            ("MAX_UPLOAD_SIZE", "2048"),
            ("DELETION_DELAY", "1"),
            ("PORT", "8080"),
            ("SWEEP_ORPHANS", "true"),
            ("LOG_FORMAT", "json"),
        ]));

        assert!(ignored.is_empty());
        assert_eq!(config.upload_path, PathBuf::from("/tmp/share"));
        assert_eq!(config.max_upload_size, 2048);
        assert_eq!(config.ttl(), Duration::from_secs(60));
        assert_eq!(config.port, 8080);
        assert!(config.sweep_orphans);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_unparseable_env_keeps_lower_layer() {
        let mut config = Config {
            max_upload_size: 4096,
            ..Config::default()
        };
        let ignored = config.apply_env_with(env(&[
            ("MAX_UPLOAD_SIZE", "ten megs"),
            ("DELETION_DELAY", "-3"),
            ("PORT", "99999"),
            ("SWEEP_ORPHANS", "maybe"),
        ]));

        let keys: Vec<&str> = ignored.iter().map(|i| i.key).collect();
        assert_eq!(
            keys,
            ["MAX_UPLOAD_SIZE", "DELETION_DELAY", "PORT", "SWEEP_ORPHANS"]
        );
        assert_eq!(ignored[0].value, "ten megs");

        assert_eq!(config.max_upload_size, 4096);
        assert_eq!(config.deletion_delay, 5);
        assert_eq!(config.port, 9090);
        assert!(!config.sweep_orphans);
    }

    #[test]
    fn test_parse_toml_partial() {
        let toml_str = r#"
upload_path = "/var/lib/ephemera"
deletion_delay = 15
log_format = "json"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.upload_path, PathBuf::from("/var/lib/ephemera"));
        assert_eq!(config.deletion_delay, 15);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.max_upload_size, constants::DEFAULT_MAX_UPLOAD_SIZE);
    }

    #[test]
    fn test_parse_toml_unknown_key() {
        assert!(toml::from_str::<Config>("upload_dir = \"/x\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ephemera.toml");
        fs::write(&path, "port = 7070\nsweep_orphans = true\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.port, 7070);
        assert!(config.sweep_orphans);

        let err = Config::load_from(dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_validate_errors() {
        let config = Config {
            max_upload_size: 0,
            port: 0,
            host: "localhost".to_string(),
            ..Config::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_upload_size"));
        assert!(err.contains("port"));
        assert!(err.contains("host"));
    }

    #[test]
    fn test_validate_upload_path_is_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = Config {
            upload_path: file.path().to_path_buf(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_delay_warns() {
        let config = Config {
            deletion_delay: 0,
            ..Config::default()
        };
        let result = config.validate().unwrap();
        assert!(result.has_warnings());
        assert!(result.warnings[0].contains("deletion_delay"));
    }

    #[test]
    fn test_listen_addr() {
        let config = Config::default();
        assert_eq!(
            config.listen_addr().unwrap(),
            "0.0.0.0:9090".parse::<SocketAddr>().unwrap()
        );
    }
}
