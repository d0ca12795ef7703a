//! Connection configuration
//!
//! A [`DeviceProfile`] names one inverter: its family and how to reach it.
//! Profiles load from TOML/YAML/JSON files merged with `INVCTL_` environment
//! variables (`__` separates nesting levels, e.g. `INVCTL_CONNECTION__UNIT_ID=2`).

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{AdapterError, AdapterResult};
use crate::families::DeviceFamily;
use crate::modbus::DEFAULT_TCP_PORT;

/// Environment variable prefix for profile overrides
pub const ENV_PREFIX: &str = "INVCTL_";

/// Highest assignable Modbus slave address
pub const MAX_UNIT_ID: u8 = 247;

/// Physical link type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Serial,
    Tcp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Serial => write!(f, "serial"),
            TransportKind::Tcp => write!(f, "tcp"),
        }
    }
}

/// Serial parity, written as `N`, `E` or `O`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Parity {
    #[default]
    #[serde(rename = "N", alias = "none", alias = "None")]
    None,
    #[serde(rename = "E", alias = "even", alias = "Even")]
    Even,
    #[serde(rename = "O", alias = "odd", alias = "Odd")]
    Odd,
}

/// Serial line parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialParams {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        }
    }
}

/// TCP endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpParams {
    pub host: String,
    pub port: u16,
}

impl Default for TcpParams {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            port: DEFAULT_TCP_PORT,
        }
    }
}

/// How to reach one device and how hard to try
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub transport: TransportKind,
    pub serial: SerialParams,
    pub tcp: TcpParams,
    /// Slave address
    pub unit_id: u8,
    /// Per-call deadline
    pub timeout_ms: u64,
    /// Attempts per transaction, including the first
    pub max_retries: u32,
    /// Pause between failed attempts
    pub retry_cooldown_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Serial,
            serial: SerialParams::default(),
            tcp: TcpParams::default(),
            unit_id: 1,
            timeout_ms: 1000,
            max_retries: 3,
            retry_cooldown_ms: 100,
        }
    }
}

impl ConnectionConfig {
    /// Serial endpoint with default line settings
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            transport: TransportKind::Serial,
            serial: SerialParams {
                port: port.into(),
                baud_rate,
                ..SerialParams::default()
            },
            ..Self::default()
        }
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            transport: TransportKind::Tcp,
            tcp: TcpParams {
                host: host.into(),
                port,
            },
            ..Self::default()
        }
    }

    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = unit_id;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.retry_cooldown_ms = cooldown.as_millis() as u64;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_millis(self.retry_cooldown_ms)
    }

    /// Human-readable endpoint, used as the log target label
    pub fn endpoint(&self) -> String {
        match self.transport {
            TransportKind::Serial => {
                format!("serial:{}@{}", self.serial.port, self.serial.baud_rate)
            },
            TransportKind::Tcp => format!("tcp://{}:{}", self.tcp.host, self.tcp.port),
        }
    }

    pub fn validate(&self) -> AdapterResult<()> {
        let fail = |msg: String| Err(AdapterError::Config(msg));

        if self.max_retries == 0 {
            return fail("max_retries must be at least 1".to_string());
        }
        if self.timeout_ms == 0 {
            return fail("timeout_ms must be greater than zero".to_string());
        }
        if self.unit_id > MAX_UNIT_ID {
            return fail(format!(
                "unit_id {} out of range (0..={MAX_UNIT_ID})",
                self.unit_id
            ));
        }
        match self.transport {
            TransportKind::Serial => {
                if self.serial.port.trim().is_empty() {
                    return fail("serial port path is empty".to_string());
                }
                if self.serial.baud_rate == 0 {
                    return fail("serial baud_rate must be greater than zero".to_string());
                }
                if !(5..=8).contains(&self.serial.data_bits) {
                    return fail(format!(
                        "serial data_bits {} out of range (5..=8)",
                        self.serial.data_bits
                    ));
                }
                if !(1..=2).contains(&self.serial.stop_bits) {
                    return fail(format!(
                        "serial stop_bits {} out of range (1..=2)",
                        self.serial.stop_bits
                    ));
                }
            },
            TransportKind::Tcp => {
                if self.tcp.host.trim().is_empty() {
                    return fail("tcp host is empty".to_string());
                }
            },
        }
        Ok(())
    }
}

/// One named device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    pub name: String,
    pub family: DeviceFamily,
    pub connection: ConnectionConfig,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            name: "inverter".to_string(),
            family: DeviceFamily::default(),
            connection: ConnectionConfig::default(),
        }
    }
}

/// Load a profile from defaults, an optional file and `INVCTL_` environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables
/// 2. Config file
/// 3. Default values
pub fn load_profile(path: Option<&Path>) -> AdapterResult<DeviceProfile> {
    load_profile_with_env(path, ENV_PREFIX)
}

/// [`load_profile`] with a custom environment prefix
pub fn load_profile_with_env(path: Option<&Path>, env_prefix: &str) -> AdapterResult<DeviceProfile> {
    let mut figment = Figment::from(Serialized::defaults(DeviceProfile::default()));

    if let Some(path) = path {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| AdapterError::Config("Config file must have an extension".to_string()))?;
        if !path.exists() {
            return Err(AdapterError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        figment = match extension {
            "toml" => figment.merge(Toml::file(path)),
            "yaml" | "yml" => figment.merge(Yaml::file(path)),
            "json" => figment.merge(Json::file(path)),
            _ => {
                return Err(AdapterError::Config(format!(
                    "Unsupported config file format: {extension}"
                )))
            },
        };
    }

    let profile: DeviceProfile = figment
        .merge(Env::prefixed(env_prefix).split("__"))
        .extract()
        .map_err(|e| AdapterError::Config(format!("Failed to load configuration: {e}")))?;

    profile.connection.validate()?;
    Ok(profile)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    // Prefix no real environment sets
    const NO_ENV: &str = "INVCTL_TEST_UNSET_PREFIX_";

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.transport, TransportKind::Serial);
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.parity, Parity::None);
        assert_eq!(config.tcp.port, 502);
        assert_eq!(config.unit_id, 1);
        assert_eq!(config.timeout(), Duration::from_secs(1));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_cooldown(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_toml_profile() {
        let file = write_config(
            ".toml",
            r#"
name = "garage"
family = "deye"

[connection]
transport = "tcp"
unit_id = 3
max_retries = 5

[connection.tcp]
host = "10.0.0.7"
port = 8899
"#,
        );

        let profile = load_profile_with_env(Some(file.path()), NO_ENV).unwrap();
        assert_eq!(profile.name, "garage");
        assert_eq!(profile.family, DeviceFamily::Deye);
        assert_eq!(profile.connection.transport, TransportKind::Tcp);
        assert_eq!(profile.connection.tcp.host, "10.0.0.7");
        assert_eq!(profile.connection.tcp.port, 8899);
        assert_eq!(profile.connection.unit_id, 3);
        assert_eq!(profile.connection.max_retries, 5);
        // Untouched fields keep their defaults
        assert_eq!(profile.connection.timeout_ms, 1000);
        assert_eq!(profile.connection.endpoint(), "tcp://10.0.0.7:8899");
    }

    #[test]
    fn test_load_yaml_profile_with_parity() {
        let file = write_config(
            ".yaml",
            r#"
family: anern
connection:
  transport: serial
  serial:
    port: /dev/ttyS1
    baud_rate: 19200
    parity: E
"#,
        );

        let profile = load_profile_with_env(Some(file.path()), NO_ENV).unwrap();
        assert_eq!(profile.family, DeviceFamily::Anern);
        assert_eq!(profile.connection.serial.port, "/dev/ttyS1");
        assert_eq!(profile.connection.serial.baud_rate, 19200);
        assert_eq!(profile.connection.serial.parity, Parity::Even);
        assert_eq!(profile.connection.serial.data_bits, 8);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_config(".json", r#"{"connection": {"unit_id": 4}}"#);
        std::env::set_var("INVCTL_TEST_ENV_CONNECTION__UNIT_ID", "9");

        let profile = load_profile_with_env(Some(file.path()), "INVCTL_TEST_ENV_").unwrap();
        assert_eq!(profile.connection.unit_id, 9);

        std::env::remove_var("INVCTL_TEST_ENV_CONNECTION__UNIT_ID");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let profile = load_profile_with_env(None, NO_ENV).unwrap();
        assert_eq!(profile, DeviceProfile::default());
    }

    #[test]
    fn test_rejects_bad_files() {
        let file = write_config(".ini", "unit_id = 1");
        assert!(matches!(
            load_profile_with_env(Some(file.path()), NO_ENV),
            Err(AdapterError::Config(_))
        ));

        let missing = Path::new("/nonexistent/profile.toml");
        assert!(load_profile_with_env(Some(missing), NO_ENV).is_err());

        let invalid = write_config(".toml", "[connection]\nmax_retries = 0\n");
        let err = load_profile_with_env(Some(invalid.path()), NO_ENV).unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_validation() {
        assert!(ConnectionConfig::default().with_max_retries(0).validate().is_err());
        assert!(ConnectionConfig::default().with_unit_id(248).validate().is_err());
        assert!(ConnectionConfig::default()
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ConnectionConfig::tcp("", 502).validate().is_err());
        assert!(ConnectionConfig::serial("  ", 9600).validate().is_err());
        assert!(ConnectionConfig::tcp("localhost", 502)
            .with_retry_cooldown(Duration::ZERO)
            .validate()
            .is_ok());
    }
}
