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

//! CLI argument definitions using clap.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use otaserve_core::UpgradePolicy;

use crate::config::{ServerConfig, TlsSettings};

#[derive(Debug, Parser)]
#[command(name = "otaserve")]
#[command(
    author,
    version,
    about = "HTTP server which delivers firmware binaries for ESP8266/ESP32 OTA updates"
)]
#[command(
    long_about = "HTTP server which delivers firmware binaries for ESP8266/ESP32 OTA updates.\n\
    \nDevices request GET /<flavor> with an x-ESP8266-version header and receive either\n\
    304 (no update) or the next firmware binary as <flavor>-<version>.bin.\n\
    \nExamples:\n  \
    otaserve --dir ~/firmware\n  \
    otaserve --config /etc/otaserve.toml --log debug\n  \
    otaserve --dir ./fw --cert server.pem --port 8443"
)]
pub struct Cli {
    /// TOML configuration file, command line flags take precedence
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Directory containing the firmware binaries to serve (default: ~/firmware)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Server port (default: 8000)
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Address to bind (default: 0.0.0.0)
    #[arg(long)]
    pub bind: Option<String>,

    /// Log level: trace, debug, info, warn, error (default: info)
    #[arg(long)]
    pub log: Option<String>,

    /// PEM certificate to enable HTTPS, may also contain the private key
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// PEM private key if it is not part of --cert
    #[arg(long, requires = "cert")]
    pub key: Option<PathBuf>,

    /// Send the binary again when the device already runs the offered version
    #[arg(long)]
    pub resend_same_version: bool,

    /// Upgrade policy: stepwise or latest (default: stepwise)
    #[arg(long)]
    pub policy: Option<UpgradePolicy>,
}

impl Cli {
    /// Resolve the effective configuration: file (or defaults), then flags.
    pub fn load_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut ServerConfig) {
        if let Some(dir) = &self.dir {
            config.firmware.directory.clone_from(dir);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = &self.bind {
            config.server.bind_address.clone_from(bind);
        }
        if let Some(level) = &self.log {
            config.logging.level.clone_from(level);
        }
        if let Some(cert) = &self.cert {
            config.tls = Some(TlsSettings {
                cert_path: cert.clone(),
                key_path: self.key.clone(),
            });
        }
        if self.resend_same_version {
            config.server.resend_same_version = true;
        }
        if let Some(policy) = self.policy {
            config.server.upgrade_policy = policy;
        }
    }
}
