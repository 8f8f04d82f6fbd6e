//! Server configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Listen address used when neither config nor environment provide one
pub const DEFAULT_ADDRESS: &str = "localhost:9100";

/// Environment variable overriding `server.address`
pub const ADDRESS_ENV: &str = "SERVER_ADDRESS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// TCP listen address, `host:port`
    #[serde(default = "ServerSettings::default_address")]
    pub address: String,
    #[serde(default = "ServerSettings::default_log_level")]
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: Self::default_address(),
            log_level: Self::default_log_level(),
        }
    }
}

impl ServerSettings {
    fn default_address() -> String {
        DEFAULT_ADDRESS.to_string()
    }

    fn default_log_level() -> String {
        "info".to_string()
    }
}

/// Printer selection and transfer timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Vendor ID as `0x` hex, e.g. `"0x04b8"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    /// Product ID as `0x` hex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    /// Serial number; takes precedence over vendor/product IDs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// Bulk OUT timeout in milliseconds (0 = unlimited)
    #[serde(default = "UsbSettings::default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Bulk IN timeout in milliseconds (0 = unlimited)
    #[serde(default = "UsbSettings::default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            vendor_id: None,
            product_id: None,
            serial: None,
            write_timeout_ms: Self::default_write_timeout_ms(),
            read_timeout_ms: Self::default_read_timeout_ms(),
        }
    }
}

/// How the binary picks a printer from the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterSelector {
    Serial(String),
    VidPid { vendor_id: u16, product_id: u16 },
    First,
}

impl UsbSettings {
    fn default_write_timeout_ms() -> u64 {
        30_000
    }

    fn default_read_timeout_ms() -> u64 {
        1_000
    }

    /// Resolve the configured selection. Call after validation.
    pub fn selector(&self) -> Result<PrinterSelector> {
        if let Some(serial) = &self.serial {
            return Ok(PrinterSelector::Serial(serial.clone()));
        }

        match (&self.vendor_id, &self.product_id) {
            (Some(vid), Some(pid)) => Ok(PrinterSelector::VidPid {
                vendor_id: parse_hex_id(vid, "vendor_id")?,
                product_id: parse_hex_id(pid, "product_id")?,
            }),
            (None, None) => Ok(PrinterSelector::First),
            _ => Err(anyhow!(
                "usb.vendor_id and usb.product_id must be set together"
            )),
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl ServerConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/escpos-usb-bridge/server.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ServerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("escpos-usb-bridge").join("server.toml")
        } else {
            PathBuf::from(".config/escpos-usb-bridge/server.toml")
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` in place of the process environment.
    ///
    /// An empty value is treated as unset.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup(ADDRESS_ENV).filter(|a| !a.is_empty()) {
            tracing::debug!("{} overrides server address: {}", ADDRESS_ENV, address);
            self.server.address = address;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.server.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.server.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.server.address.is_empty() {
            return Err(anyhow!("server.address must not be empty"));
        }

        if let Some(vid) = &self.usb.vendor_id {
            Self::validate_hex_id(vid, "vendor_id")?;
        }
        if let Some(pid) = &self.usb.product_id {
            Self::validate_hex_id(pid, "product_id")?;
        }
        if self.usb.vendor_id.is_some() != self.usb.product_id.is_some() {
            return Err(anyhow!(
                "usb.vendor_id and usb.product_id must be set together"
            ));
        }

        Ok(())
    }

    /// Validate a hex ID (vendor or product)
    fn validate_hex_id(id: &str, name: &str) -> Result<()> {
        parse_hex_id(id, name).map(|_| ())
    }
}

fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
    let Some(hex_part) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) else {
        return Err(anyhow!(
            "Invalid {} '{}', must start with '0x' (e.g., '0x04b8')",
            name,
            id
        ));
    };

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(anyhow!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name,
            id
        ));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
}

/// Load from a user-supplied path, expanding a leading `~`
pub fn load_config(path: &str) -> Result<ServerConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    ServerConfig::load(Some(path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.address, "localhost:9100");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.usb.write_timeout(), Duration::from_secs(30));
        assert_eq!(config.usb.read_timeout(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_hex_id() {
        assert!(ServerConfig::validate_hex_id("0x04b8", "vendor_id").is_ok());
        assert!(ServerConfig::validate_hex_id("0XABCD", "vendor_id").is_ok());
        assert!(ServerConfig::validate_hex_id("0x1", "vendor_id").is_ok());

        assert!(ServerConfig::validate_hex_id("04b8", "vendor_id").is_err());
        assert!(ServerConfig::validate_hex_id("0x", "vendor_id").is_err());
        assert!(ServerConfig::validate_hex_id("0x12345", "vendor_id").is_err());
        assert!(ServerConfig::validate_hex_id("0xGHIJ", "vendor_id").is_err());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = ServerConfig::default();
        config.server.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.server.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_vid_pid_must_be_paired() {
        let mut config = ServerConfig::default();
        config.usb.vendor_id = Some("0x04b8".to_string());
        assert!(config.validate().is_err());
        assert!(config.usb.selector().is_err());

        config.usb.product_id = Some("0x0202".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(
            config.usb.selector().unwrap(),
            PrinterSelector::VidPid {
                vendor_id: 0x04b8,
                product_id: 0x0202
            }
        );
    }

    #[test]
    fn test_serial_takes_precedence() {
        let mut config = ServerConfig::default();
        config.usb.vendor_id = Some("0x04b8".to_string());
        config.usb.product_id = Some("0x0202".to_string());
        config.usb.serial = Some("TM123".to_string());

        assert_eq!(
            config.usb.selector().unwrap(),
            PrinterSelector::Serial("TM123".to_string())
        );
    }

    #[test]
    fn test_default_selector_is_first() {
        assert_eq!(
            UsbSettings::default().selector().unwrap(),
            PrinterSelector::First
        );
    }

    #[test]
    fn test_env_overrides_address() {
        let mut config = ServerConfig::default();
        config.apply_env_from(|key| (key == ADDRESS_ENV).then(|| "0.0.0.0:9200".to_string()));
        assert_eq!(config.server.address, "0.0.0.0:9200");
    }

    #[test]
    fn test_empty_env_is_ignored() {
        let mut config = ServerConfig::default();
        config.apply_env_from(|_| Some(String::new()));
        assert_eq!(config.server.address, DEFAULT_ADDRESS);

        config.apply_env_from(|_| None);
        assert_eq!(config.server.address, DEFAULT_ADDRESS);
    }

    #[test]
    fn test_zero_timeout_is_unlimited() {
        let usb = UsbSettings {
            write_timeout_ms: 0,
            ..UsbSettings::default()
        };
        assert_eq!(usb.write_timeout(), Duration::ZERO);
    }
}
