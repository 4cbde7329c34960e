// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of otaserve.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::{Context, Result, bail};
use otaserve_core::UpgradePolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub firmware: FirmwareSettings,
    #[serde(default)]
    pub tls: Option<TlsSettings>,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Stream the binary again when the device already runs the offered version
    #[serde(default)]
    pub resend_same_version: bool,
    #[serde(default)]
    pub upgrade_policy: UpgradePolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirmwareSettings {
    #[serde(default = "default_firmware_directory")]
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsSettings {
    /// PEM certificate chain, may also hold the private key
    pub cert_path: PathBuf,
    /// PEM private key, defaults to `cert_path`
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8000
}

fn default_firmware_directory() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
        .join("firmware")
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            resend_same_version: false,
            upgrade_policy: UpgradePolicy::default(),
        }
    }
}

impl Default for FirmwareSettings {
    fn default() -> Self {
        Self {
            directory: default_firmware_directory(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TlsSettings {
    pub fn key_path(&self) -> &Path {
        self.key_path.as_deref().unwrap_or(&self.cert_path)
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.trim().is_empty() {
            bail!("server.bind_address must not be empty");
        }
        if self.firmware.directory.as_os_str().is_empty() {
            bail!("firmware.directory must be set");
        }
        if let Some(tls) = &self.tls
            && tls.cert_path.as_os_str().is_empty()
        {
            bail!("tls.cert_path must be set when the [tls] section is present");
        }
        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            bail!(
                "logging.level must be one of {}, got {:?}",
                LOG_LEVELS.join(", "),
                self.logging.level
            );
        }
        Ok(())
    }

    /// Checked at startup only, the directory is re-listed per request.
    pub fn check_firmware_directory(&self) -> Result<()> {
        let dir = &self.firmware.directory;
        let meta = std::fs::metadata(dir)
            .with_context(|| format!("Firmware directory {} is not accessible", dir.display()))?;
        if !meta.is_dir() {
            bail!("Firmware directory {} is not a directory", dir.display());
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    /// Filter directive for the tracing subscriber
    pub fn log_directive(&self) -> String {
        let level = self.logging.level.to_ascii_lowercase();
        format!("otaserve={level},otaserve_server={level},otaserve_core={level}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = ServerConfig::parse("").unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert!(!config.server.resend_same_version);
        assert_eq!(config.server.upgrade_policy, UpgradePolicy::Stepwise);
        assert!(config.firmware.directory.ends_with("firmware"));
        assert!(config.tls.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_config() {
        let config = ServerConfig::parse(
            r#"
[server]
bind_address = "127.0.0.1"
port = 8443
resend_same_version = true
upgrade_policy = "latest"

[firmware]
directory = "/srv/firmware"

[tls]
cert_path = "/etc/otaserve/server.pem"

[logging]
level = "DEBUG"
"#,
        )
        .unwrap();

        assert_eq!(config.bind_addr(), "127.0.0.1:8443");
        assert!(config.server.resend_same_version);
        assert_eq!(config.server.upgrade_policy, UpgradePolicy::Latest);
        assert_eq!(config.firmware.directory, PathBuf::from("/srv/firmware"));
        let tls = config.tls.as_ref().unwrap();
        assert_eq!(tls.key_path(), Path::new("/etc/otaserve/server.pem"));
        assert_eq!(
            config.log_directive(),
            "otaserve=debug,otaserve_server=debug,otaserve_core=debug"
        );
    }

    #[test]
    fn test_separate_key_path() {
        let config = ServerConfig::parse(
            r#"
[tls]
cert_path = "cert.pem"
key_path = "key.pem"
"#,
        )
        .unwrap();
        assert_eq!(config.tls.unwrap().key_path(), Path::new("key.pem"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ServerConfig::parse("[server]\nupgrade_policy = \"newest\"\n").is_err());
        assert!(ServerConfig::parse("[logging]\nlevel = \"loud\"\n").is_err());
        assert!(ServerConfig::parse("[firmware]\ndirectory = \"\"\n").is_err());
        assert!(ServerConfig::parse("[tls]\ncert_path = \"\"\n").is_err());
        assert!(ServerConfig::parse("[server]\nbind_address = \" \"\n").is_err());
        assert!(ServerConfig::parse("[server]\nport = 70000\n").is_err());
    }

    #[test]
    fn test_check_firmware_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();

        config.firmware.directory = dir.path().to_path_buf();
        assert!(config.check_firmware_directory().is_ok());

        config.firmware.directory = dir.path().join("missing");
        assert!(config.check_firmware_directory().is_err());

        let file = dir.path().join("sensor-1.0.bin");
        std::fs::write(&file, b"fw").unwrap();
        config.firmware.directory = file;
        assert!(config.check_firmware_directory().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("otaserve.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert!(ServerConfig::from_file(&dir.path().join("nope.toml")).is_err());
    }
}
